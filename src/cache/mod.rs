// HTTP 缓存校验
// 计算资源指纹，判断客户端缓存是否可以继续使用

pub mod headers;
mod validator;

pub use validator::{CacheDescriptor, CacheValidator, Cacheable};
