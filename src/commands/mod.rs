pub mod realtime_session;
pub mod update_control;
