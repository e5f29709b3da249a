//! Small ASCII sub-protocols that ride on side-channel TCP/UDP connections
//! rather than the JSON-RPC envelope itself (spec §6).

use crate::JobId;

/// UDP discovery ping payload (spec §6). Anything else is ignored.
pub const DISCOVERY_PING: &[u8] = b"SimpleJsonRpc Ping";

/// Encode the RPC server's port as a 4-byte little-endian integer, the
/// discovery responder's reply payload.
pub fn encode_discovery_port(port: u16) -> [u8; 4] {
    (port as u32).to_le_bytes()
}

/// Format the completion callback payload: ASCII bytes `JOB <id> COMPLETED`
/// with no trailing newline, sent on a fresh TCP connection and then the
/// connection is closed.
pub fn format_callback_message(id: JobId) -> String {
    format!("JOB {} COMPLETED", id.0)
}

/// Parse a callback payload back into a job id. Returns `None` if the
/// payload doesn't match the expected `JOB <id> COMPLETED` shape.
pub fn parse_callback_message(payload: &str) -> Option<JobId> {
    let rest = payload.strip_prefix("JOB ")?;
    let (id_str, rest) = rest.split_once(' ')?;
    if rest != "COMPLETED" {
        return None;
    }
    id_str.parse::<u64>().ok().map(JobId)
}

/// First two lines of a backup log file (spec §6 "Backup log format"):
/// `SimpleRemote Job <id> Output - <locale datetime>` followed by the
/// command line, then a blank line, then captured output one line per
/// newline.
pub fn format_backup_header(id: JobId, timestamp: &str, command_line: &str) -> String {
    format!("SimpleRemote Job {} Output - {timestamp}\n{command_line}\n\n", id.0)
}

/// Backup file name stem: `SimpleRemote-JobOutput-<ISO8601 timestamp>.txt`
/// (spec §4.3). `iso_timestamp` should already have any filesystem-unsafe
/// characters (`:`) stripped by the caller.
pub fn backup_file_name(iso_timestamp: &str) -> String {
    format!("SimpleRemote-JobOutput-{iso_timestamp}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_message_round_trips() {
        let msg = format_callback_message(JobId(42));
        assert_eq!(msg, "JOB 42 COMPLETED");
        assert_eq!(parse_callback_message(&msg), Some(JobId(42)));
    }

    #[test]
    fn callback_message_rejects_garbage() {
        assert_eq!(parse_callback_message("nonsense"), None);
        assert_eq!(parse_callback_message("JOB COMPLETED"), None);
        assert_eq!(parse_callback_message("JOB abc COMPLETED"), None);
    }

    #[test]
    fn discovery_port_is_little_endian() {
        assert_eq!(encode_discovery_port(1), [1, 0, 0, 0]);
        assert_eq!(encode_discovery_port(0x0102), [0x02, 0x01, 0, 0]);
    }
}
