//! 网络层：页面与图片获取。

pub mod network;
