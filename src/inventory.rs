//! Certificate Inventory
//!
//! Reads the CA ledger (OpenSSL's `index.txt`) into [`CertificateRecord`]s. The
//! inventory is rebuilt from the file on every call and keeps the ledger's line order,
//! which is the order certificates were issued in.
//!
//! # Ledger format
//!
//! One line per certificate, fields separated by tabs:
//!
//! ```text
//! V    341231235959Z              0A  unknown  /CN=alice
//! R    341231235959Z  250301120000Z,keyCompromise  0B  unknown  /CN=bob
//! ```
//!
//! OpenSSL leaves the revocation field empty for certificates that are not revoked,
//! which shows up as two consecutive tabs. Runs of tabs are treated as one separator,
//! so valid lines have five fields and revoked ones six.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{PkiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CertificateState {
    #[serde(rename = "V")]
    Valid,
    #[serde(rename = "R")]
    Revoked,
    #[serde(rename = "E")]
    Expired,
}

impl CertificateState {
    /// Single-letter code used in the ledger
    pub fn code(&self) -> &'static str {
        match self {
            CertificateState::Valid => "V",
            CertificateState::Revoked => "R",
            CertificateState::Expired => "E",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "V" => Some(CertificateState::Valid),
            "R" => Some(CertificateState::Revoked),
            "E" => Some(CertificateState::Expired),
            _ => None,
        }
    }
}

impl FromStr for CertificateState {
    type Err = String;

    /// Accepts ledger codes and lowercase names (`valid`, `revoked`, `expired`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v" | "valid" => Ok(CertificateState::Valid),
            "r" | "revoked" => Ok(CertificateState::Revoked),
            "e" | "expired" => Ok(CertificateState::Expired),
            _ => Err(format!("unknown certificate state `{}`", s)),
        }
    }
}

/// Certificate serial as the hexadecimal the CA tool writes, upper-cased.
/// Serials are not bounded in width; `openssl ca -create_serial` writes 159-bit ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Serial(String);

impl Serial {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for Serial {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("invalid serial `{}`", s));
        }
        Ok(Serial(s.to_ascii_uppercase()))
    }
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub state: CertificateState,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    pub serial: Serial,
    pub subject: String,
    pub common_name: String,
}

/// All ledger records in ledger order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Inventory {
    records: Vec<CertificateRecord>,
}

impl Inventory {
    pub fn records(&self) -> &[CertificateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateRecord> {
        self.records.iter()
    }

    pub fn by_state(&self, state: CertificateState) -> impl Iterator<Item = &CertificateRecord> {
        self.records.iter().filter(move |r| r.state == state)
    }

    /// Every record for `common_name`, oldest first
    pub fn find_by_common_name<'a>(
        &'a self,
        common_name: &'a str,
    ) -> impl Iterator<Item = &'a CertificateRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.common_name == common_name)
    }
}

/// Read and decode the ledger at `ledger_path`
pub async fn list_certificates(ledger_path: &Path) -> Result<Inventory> {
    let text = tokio::fs::read_to_string(ledger_path)
        .await
        .map_err(|source| PkiError::LedgerRead {
            path: ledger_path.to_path_buf(),
            source,
        })?;
    let inventory = parse_ledger(&text)?;
    debug!(
        "Read {} ledger records from {}",
        inventory.len(),
        ledger_path.display()
    );
    Ok(inventory)
}

/// Decode ledger text. Line numbers in errors are 1-based.
pub fn parse_ledger(text: &str) -> Result<Inventory> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let records = lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| parse_line(line.strip_suffix('\r').unwrap_or(line), index + 1))
        .collect::<Result<Vec<_>>>()?;
    Ok(Inventory { records })
}

fn parse_line(line: &str, line_number: usize) -> Result<CertificateRecord> {
    let format_error = |reason: String| PkiError::LedgerFormat {
        line_number,
        reason,
    };

    let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
    let (state, expiry, revocation, serial, subject) = match fields.as_slice() {
        [state, expiry, serial, _file, subject] => (*state, *expiry, None, *serial, *subject),
        [state, expiry, revocation, serial, _file, subject] => {
            (*state, *expiry, Some(*revocation), *serial, *subject)
        }
        _ => {
            return Err(format_error(format!(
                "expected 5 or 6 fields, found {}",
                fields.len()
            )))
        }
    };

    let state = CertificateState::from_code(state)
        .ok_or_else(|| format_error(format!("unknown state code `{}`", state)))?;

    let expires_at = parse_ledger_time(expiry)
        .ok_or_else(|| format_error(format!("invalid expiry `{}`", expiry)))?;

    let (revoked_at, revocation_reason) = match revocation {
        Some(field) => {
            let (date, reason) = match field.split_once(',') {
                Some((date, reason)) => (date, Some(reason.to_string())),
                None => (field, None),
            };
            let revoked_at = parse_ledger_time(date)
                .ok_or_else(|| format_error(format!("invalid revocation date `{}`", date)))?;
            (Some(revoked_at), reason)
        }
        None => (None, None),
    };

    let serial: Serial = serial.parse().map_err(format_error)?;

    let common_name = common_name(subject).ok_or_else(|| PkiError::SubjectParse {
        line_number,
        subject: subject.to_string(),
    })?;

    Ok(CertificateRecord {
        state,
        expires_at,
        revoked_at,
        revocation_reason,
        serial,
        subject: subject.to_string(),
        common_name: common_name.to_string(),
    })
}

/// `YYMMDDHHMMSSZ` (UTCTime, years below 50 are 20xx) or `YYYYMMDDHHMMSSZ`
/// (GeneralizedTime, written for dates from 2050 on)
pub fn parse_ledger_time(value: &str) -> Option<DateTime<Utc>> {
    let digits = value.strip_suffix('Z')?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let full = match digits.len() {
        12 => {
            let yy: u32 = digits[..2].parse().ok()?;
            let century = if yy < 50 { 20 } else { 19 };
            format!("{}{}", century, digits)
        }
        14 => digits.to_string(),
        _ => return None,
    };
    NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Value of the first `/CN=` component of a slash-separated subject
fn common_name(subject: &str) -> Option<&str> {
    subject
        .split('/')
        .skip(1)
        .find_map(|component| component.strip_prefix("CN="))
        .filter(|cn| !cn.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_single_line() {
        let inventory = parse_ledger("V\t250101000000Z\t01\tunused\t/CN=alice\n").unwrap();
        assert_eq!(inventory.len(), 1);
        let record = &inventory.records()[0];
        assert_eq!(record.state, CertificateState::Valid);
        assert_eq!(record.state.code(), "V");
        assert_eq!(record.expires_at, utc(2025, 1, 1, 0, 0, 0));
        assert_eq!(record.serial.as_hex(), "01");
        assert_eq!(record.subject, "/CN=alice");
        assert_eq!(record.common_name, "alice");
        assert_eq!(record.revoked_at, None);
    }

    #[test]
    fn test_openssl_written_lines_keep_order() {
        let ledger = "V\t341231235959Z\t\t0A\tunknown\t/CN=carol\n\
                      R\t341231235959Z\t250301120000Z,keyCompromise\t0B\tunknown\t/CN=bob\n\
                      E\t200101000000Z\t\t0C\tunknown\t/CN=alice/emailAddress=alice@example.net\n";
        let inventory = parse_ledger(ledger).unwrap();
        let names: Vec<_> = inventory.iter().map(|r| r.common_name.as_str()).collect();
        assert_eq!(names, ["carol", "bob", "alice"]);

        let records = inventory.records();
        assert_eq!(records[0].serial.as_hex(), "0A");
        assert_eq!(records[0].expires_at, utc(2034, 12, 31, 23, 59, 59));

        assert_eq!(records[1].state, CertificateState::Revoked);
        assert_eq!(records[1].revoked_at, Some(utc(2025, 3, 1, 12, 0, 0)));
        assert_eq!(records[1].revocation_reason.as_deref(), Some("keyCompromise"));
        assert_eq!(records[1].serial.as_hex(), "0B");

        assert_eq!(records[2].state, CertificateState::Expired);
        assert_eq!(records[2].expires_at, utc(2020, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_n_lines_give_n_records() {
        let ledger: String = (1..=25)
            .map(|i| format!("V\t300101000000Z\t\t{:02X}\tunknown\t/CN=user{}\n", i, i))
            .collect();
        let inventory = parse_ledger(&ledger).unwrap();
        assert_eq!(inventory.len(), 25);
        for (i, record) in inventory.iter().enumerate() {
            assert_eq!(record.serial.to_string(), format!("{:02X}", i + 1));
            assert_eq!(record.common_name, format!("user{}", i + 1));
        }
    }

    #[test]
    fn test_wide_serials() {
        let ledger = "V\t340101000000Z\t\t5A1B2C3D4E5F60718293A4B5C6D7E8F901234567\tunknown\t/CN=alice\n\
                      V\t340101000000Z\t\t00ffee0123456789abcdef0123456789abcdef0123\tunknown\t/CN=bob\n";
        let inventory = parse_ledger(ledger).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(
            inventory.records()[0].serial.as_hex(),
            "5A1B2C3D4E5F60718293A4B5C6D7E8F901234567"
        );
        assert_eq!(
            inventory.records()[1].serial.as_hex(),
            "00FFEE0123456789ABCDEF0123456789ABCDEF0123"
        );
        assert_eq!(inventory.records()[1].common_name, "bob");
    }

    #[test]
    fn test_empty_ledger() {
        assert!(parse_ledger("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_trailing_newline_keeps_last_record() {
        let ledger = "V\t300101000000Z\t\t01\tunknown\t/CN=a\nV\t300101000000Z\t\t02\tunknown\t/CN=b";
        assert_eq!(parse_ledger(ledger).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_cn_is_subject_error() {
        let ledger = "V\t300101000000Z\t\t01\tunknown\t/CN=a\n\
                      V\t300101000000Z\t\t02\tunknown\t/O=Example/OU=Ops\n";
        match parse_ledger(ledger).unwrap_err() {
            PkiError::SubjectParse {
                line_number,
                subject,
            } => {
                assert_eq!(line_number, 2);
                assert_eq!(subject, "/O=Example/OU=Ops");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_cn_is_subject_error() {
        let err = parse_ledger("V\t300101000000Z\t01\tunknown\t/CN=/O=Example\n").unwrap_err();
        assert!(matches!(err, PkiError::SubjectParse { line_number: 1, .. }));
    }

    #[test]
    fn test_format_errors_report_line() {
        let cases = [
            "X\t300101000000Z\t01\tunknown\t/CN=a",
            "V\t3001010000Z\t01\tunknown\t/CN=a",
            "V\t301301000000Z\t01\tunknown\t/CN=a",
            "V\t300101000000Z\tzz\tunknown\t/CN=a",
            "V\t300101000000Z\t/CN=a",
            "",
        ];
        for case in cases {
            let ledger = format!("V\t300101000000Z\t01\tunknown\t/CN=ok\n{}\n", case);
            match parse_ledger(&ledger) {
                Err(PkiError::LedgerFormat { line_number, .. }) => assert_eq!(line_number, 2),
                other => panic!("{:?} gave {:?}", case, other),
            }
        }
    }

    #[test]
    fn test_ledger_time_forms() {
        assert_eq!(
            parse_ledger_time("491231235959Z"),
            Some(utc(2049, 12, 31, 23, 59, 59))
        );
        assert_eq!(
            parse_ledger_time("500101000000Z"),
            Some(utc(1950, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_ledger_time("20510615083000Z"),
            Some(utc(2051, 6, 15, 8, 30, 0))
        );
        assert_eq!(parse_ledger_time("250101000000"), None);
        assert_eq!(parse_ledger_time("2501010000ÄÄZ"), None);
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            "valid".parse::<CertificateState>(),
            Ok(CertificateState::Valid)
        );
        assert_eq!("R".parse::<CertificateState>(), Ok(CertificateState::Revoked));
        assert_eq!(
            "Expired".parse::<CertificateState>(),
            Ok(CertificateState::Expired)
        );
        assert!("pending".parse::<CertificateState>().is_err());
    }

    #[test]
    fn test_filters() {
        let ledger = "V\t300101000000Z\t\t01\tunknown\t/CN=alice\n\
                      R\t300101000000Z\t240101000000Z\t02\tunknown\t/CN=alice\n\
                      V\t300101000000Z\t\t03\tunknown\t/CN=bob\n";
        let inventory = parse_ledger(ledger).unwrap();
        assert_eq!(inventory.by_state(CertificateState::Valid).count(), 2);
        let serials: Vec<_> = inventory
            .find_by_common_name("alice")
            .map(|r| r.serial.as_hex())
            .collect();
        assert_eq!(serials, ["01", "02"]);
    }

    #[test]
    fn test_serialized_record() {
        let inventory = parse_ledger("V\t250101000000Z\t01\tunused\t/CN=alice\n").unwrap();
        let json = serde_json::to_value(&inventory).unwrap();
        assert_eq!(json[0]["state"], "V");
        assert_eq!(json[0]["expires_at"], "2025-01-01T00:00:00Z");
        assert_eq!(json[0]["serial"], "01");
        assert_eq!(json[0]["common_name"], "alice");
        assert!(json[0].get("revoked_at").is_none());
    }

    #[tokio::test]
    async fn test_list_certificates_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "V\t300101000000Z\t\t01\tunknown\t/CN=alice\nV\t300101000000Z\t\t02\tunknown\t/CN=bob\n"
        )
        .unwrap();
        let inventory = list_certificates(file.path()).await.unwrap();
        assert_eq!(inventory.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_ledger_is_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = list_certificates(&dir.path().join("index.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, PkiError::LedgerRead { .. }));
    }
}
