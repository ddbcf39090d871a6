pub const TOPIC_ROOT: &str = "irschedule";

pub fn command_topic(node_id: u32) -> String {
    format!("{TOPIC_ROOT}/{node_id}/command")
}

pub fn cycle_topic(node_id: u32) -> String {
    format!("{TOPIC_ROOT}/{node_id}/cycle")
}

pub fn status_topic(node_id: u32) -> String {
    format!("{TOPIC_ROOT}/{node_id}/status")
}
