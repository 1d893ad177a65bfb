// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of Logplex request bodies.
//!
//! Logplex frames each syslog record with octet counting (RFC 6587 section
//! 3.4.1): `<length> <record>`, where the length covers the record including
//! its trailing newline. Records are RFC5424 without STRUCTURED-DATA, e.g.
//!
//! ```text
//! 83 <40>1 2012-11-30T06:45:29+00:00 host app web.3 - State changed from starting to up
//! ```

use syslog_loose::{ProcId, Protocol, SyslogFacility, SyslogSeverity, Variant};

use crate::errors::DecodeError;
use crate::message::LogplexMessage;

/// Decodes every record in a Logplex body. A single bad record fails the
/// whole batch.
pub fn decode_batch(body: &[u8]) -> Result<Vec<LogplexMessage>, DecodeError> {
    FrameSplitter::new(body)
        .map(|frame| {
            let (offset, bytes) = frame?;
            parse_record(offset, bytes)
        })
        .collect()
}

/// Splits a body into octet-counted frames, yielding the byte offset of each
/// frame's length prefix alongside the frame contents.
struct FrameSplitter<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> FrameSplitter<'a> {
    fn new(body: &'a [u8]) -> Self {
        FrameSplitter { body, pos: 0 }
    }

    fn next_frame(&mut self) -> Option<Result<(usize, &'a [u8]), DecodeError>> {
        while self.pos < self.body.len() && self.body[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= self.body.len() {
            return None;
        }

        let start = self.pos;
        let digits_end = self.body[start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(self.body.len(), |i| start + i);

        let declared = match std::str::from_utf8(&self.body[start..digits_end])
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
        {
            Some(len) if len > 0 => len,
            _ => return Some(Err(DecodeError::InvalidLength { offset: start })),
        };

        if self.body.get(digits_end) != Some(&b' ') {
            return Some(Err(DecodeError::MissingSeparator { offset: digits_end }));
        }

        let frame_start = digits_end + 1;
        let available = self.body.len() - frame_start;
        if declared > available {
            return Some(Err(DecodeError::Truncated {
                offset: start,
                declared,
                available,
            }));
        }

        self.pos = frame_start + declared;
        Some(Ok((start, &self.body[frame_start..self.pos])))
    }
}

impl<'a> Iterator for FrameSplitter<'a> {
    type Item = Result<(usize, &'a [u8]), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next_frame();
        if let Some(Err(_)) = frame {
            // nothing after a framing error can be trusted
            self.pos = self.body.len();
        }
        frame
    }
}

fn parse_record(offset: usize, bytes: &[u8]) -> Result<LogplexMessage, DecodeError> {
    let record = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { offset })?;
    let record = record.trim_end_matches(['\n', '\r']);
    if !record.starts_with('<') {
        return Err(DecodeError::MissingPriority { offset });
    }

    let parsed = syslog_loose::parse_message(record, Variant::Either);

    let version = match parsed.protocol {
        Protocol::RFC5424(version) => version,
        Protocol::RFC3164 => return Err(DecodeError::NotRfc5424 { offset }),
    };
    let (Some(facility), Some(severity)) = (parsed.facility, parsed.severity) else {
        return Err(DecodeError::MissingPriority { offset });
    };
    let timestamp = parsed
        .timestamp
        .ok_or(DecodeError::MissingTimestamp { offset })?;

    Ok(LogplexMessage {
        facility: facility_code(facility),
        severity: severity_code(severity),
        version,
        timestamp,
        hostname: parsed.hostname.map(str::to_string),
        app_name: parsed.appname.map(str::to_string),
        proc_id: parsed.procid.map(|procid| match procid {
            ProcId::PID(pid) => pid.to_string(),
            ProcId::Name(name) => name.to_string(),
        }),
        msg_id: parsed.msgid.map(str::to_string),
        msg: parsed.msg.to_string(),
    })
}

fn facility_code(facility: SyslogFacility) -> u8 {
    match facility {
        SyslogFacility::LOG_KERN => 0,
        SyslogFacility::LOG_USER => 1,
        SyslogFacility::LOG_MAIL => 2,
        SyslogFacility::LOG_DAEMON => 3,
        SyslogFacility::LOG_AUTH => 4,
        SyslogFacility::LOG_SYSLOG => 5,
        SyslogFacility::LOG_LPR => 6,
        SyslogFacility::LOG_NEWS => 7,
        SyslogFacility::LOG_UUCP => 8,
        SyslogFacility::LOG_CRON => 9,
        SyslogFacility::LOG_AUTHPRIV => 10,
        SyslogFacility::LOG_FTP => 11,
        SyslogFacility::LOG_NTP => 12,
        SyslogFacility::LOG_AUDIT => 13,
        SyslogFacility::LOG_ALERT => 14,
        SyslogFacility::LOG_CLOCKD => 15,
        SyslogFacility::LOG_LOCAL0 => 16,
        SyslogFacility::LOG_LOCAL1 => 17,
        SyslogFacility::LOG_LOCAL2 => 18,
        SyslogFacility::LOG_LOCAL3 => 19,
        SyslogFacility::LOG_LOCAL4 => 20,
        SyslogFacility::LOG_LOCAL5 => 21,
        SyslogFacility::LOG_LOCAL6 => 22,
        SyslogFacility::LOG_LOCAL7 => 23,
    }
}

fn severity_code(severity: SyslogSeverity) -> u8 {
    match severity {
        SyslogSeverity::SEV_EMERG => 0,
        SyslogSeverity::SEV_ALERT => 1,
        SyslogSeverity::SEV_CRIT => 2,
        SyslogSeverity::SEV_ERR => 3,
        SyslogSeverity::SEV_WARNING => 4,
        SyslogSeverity::SEV_NOTICE => 5,
        SyslogSeverity::SEV_INFO => 6,
        SyslogSeverity::SEV_DEBUG => 7,
    }
}
