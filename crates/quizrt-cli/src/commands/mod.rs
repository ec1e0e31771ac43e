pub mod init;
pub mod quit;
pub mod status;
pub mod take;
