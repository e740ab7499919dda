//! 解析与导出模块入口。
//!
//! 负责索引页解析、正文清洗、封面处理，以及 EPUB 包的生成与写出。

pub mod content_cleaner;
pub mod cover;
pub mod epub_generator;
pub(crate) mod image_utils;
pub mod index_parser;
pub mod packager;
pub(crate) mod xhtml;
