pub mod backup_config;
pub mod encrypt;
pub mod file_ext;
pub mod file_name;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod runner;
pub mod tar;
pub mod tool;
pub mod validate;
