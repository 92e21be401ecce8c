//! CLI command implementations

pub mod attach;
pub mod down;
pub mod exec;
pub mod head_ip;
pub mod kill_node;
pub mod monitor;
pub mod request_resources;
pub mod rsync;
pub mod status;
pub mod up;
pub mod worker_ips;

pub use attach::execute as attach;
pub use down::execute as down;
pub use exec::execute as exec;
pub use head_ip::execute as head_ip;
pub use kill_node::execute as kill_node;
pub use monitor::execute as monitor;
pub use request_resources::execute as request_resources;
pub use rsync::execute as rsync;
pub use status::execute as status;
pub use up::execute as up;
pub use worker_ips::execute as worker_ips;
