pub mod banks;
pub mod init;
pub mod practice;
pub mod report;
pub mod validate;
