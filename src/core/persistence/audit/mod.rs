pub mod fs_audit_logger;
