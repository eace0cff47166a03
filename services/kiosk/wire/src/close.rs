//! Connection close codes used by the control connection.

/// Normal closure, used when the client disconnects on purpose
pub const NORMAL: u16 = 1000;

/// Endpoint going away (server shutdown, page unload)
pub const GOING_AWAY: u16 = 1001;

/// Close frame carried no status code
pub const NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame
pub const ABNORMAL: u16 = 1006;

/// Short human-readable name for a close code
pub fn describe(code: u16) -> &'static str {
    match code {
        NORMAL => "normal closure",
        GOING_AWAY => "going away",
        1002 => "protocol error",
        1003 => "unsupported data",
        NO_STATUS => "no status",
        ABNORMAL => "abnormal closure",
        1008 => "policy violation",
        1011 => "server error",
        4000..=4999 => "application defined",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(NORMAL), "normal closure");
        assert_eq!(describe(ABNORMAL), "abnormal closure");
        assert_eq!(describe(4001), "application defined");
        assert_eq!(describe(42), "unknown");
    }
}
