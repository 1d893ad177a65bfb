// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, FixedOffset};

/// Written in place of a missing hostname, app name or process id, matching
/// the syslog NILVALUE.
pub const NIL_VALUE: &str = "-";

const FACILITY_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron", "authpriv",
    "ftp", "ntp", "audit", "alert", "clock", "local0", "local1", "local2", "local3", "local4",
    "local5", "local6", "local7",
];

const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// One syslog record decoded from a Logplex frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogplexMessage {
    /// Numeric syslog facility, 0 through 23.
    pub facility: u8,
    /// Numeric syslog severity, 0 through 7.
    pub severity: u8,
    pub version: u32,
    pub timestamp: DateTime<FixedOffset>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    pub msg: String,
}

impl LogplexMessage {
    pub fn facility_name(&self) -> &'static str {
        FACILITY_NAMES
            .get(usize::from(self.facility))
            .copied()
            .unwrap_or("unknown")
    }

    pub fn severity_name(&self) -> &'static str {
        SEVERITY_NAMES
            .get(usize::from(self.severity))
            .copied()
            .unwrap_or("unknown")
    }

    pub fn hostname_or_nil(&self) -> &str {
        self.hostname.as_deref().unwrap_or(NIL_VALUE)
    }

    pub fn app_name_or_nil(&self) -> &str {
        self.app_name.as_deref().unwrap_or(NIL_VALUE)
    }

    pub fn proc_id_or_nil(&self) -> &str {
        self.proc_id.as_deref().unwrap_or(NIL_VALUE)
    }

    /// Formats the message as the single line appended to its log file,
    /// without the trailing newline:
    ///
    /// `<timestamp> <facility>.<severity> <drain token> <hostname> <app> <procid> <message>`
    ///
    /// Line breaks inside the message body are escaped so one record always
    /// maps to one line.
    pub fn to_log_line(&self, drain_token: &str) -> String {
        let drain_token = if drain_token.is_empty() {
            NIL_VALUE
        } else {
            drain_token
        };
        format!(
            "{} {}.{} {} {} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.facility_name(),
            self.severity_name(),
            drain_token,
            self.hostname_or_nil(),
            self.app_name_or_nil(),
            self.proc_id_or_nil(),
            escape_line_breaks(&self.msg),
        )
    }
}

fn escape_line_breaks(msg: &str) -> String {
    msg.replace('\r', "\\r").replace('\n', "\\n")
}
