mod detect;
mod error;
mod parser;

pub use detect::visit_mount_infos;
pub use error::{Error, Result};
pub use parser::{MountInfo, MountInfoField, ParseError, parse_mount_info_line};
