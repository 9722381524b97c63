//! Infrastructure adapters: real OS and network implementations of the
//! domain ports.

pub mod iptables;
pub mod pid_file;
pub mod tcp_probe;
pub mod unix_runner;

pub use iptables::IptablesFirewall;
pub use pid_file::{PidFile, PidRecord};
pub use tcp_probe::TcpLivenessProbe;
pub use unix_runner::UnixProcessRunner;
