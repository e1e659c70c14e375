//! srlog: NDJSON capture files. One header line, then one record per frame.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use nuttx_can::CanFrame;

use crate::config::Backend;

#[derive(Debug, Serialize, Deserialize)]
pub struct Header {
    pub format: String,
    pub version: u32,
    pub backend: Backend,
    pub device: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
    pub ts: String,
    pub id: String,
    pub len: usize,
    pub data: String,
}

pub fn header_line(backend: Backend, device: &str) -> Result<String> {
    let header = Header {
        format: "srlog".to_string(),
        version: 1,
        backend,
        device: device.to_string(),
    };
    Ok(serde_json::to_string(&header)?)
}

pub fn parse_header(line: &str) -> Result<Header> {
    let header: Header = serde_json::from_str(line)?;
    if header.format != "srlog" {
        return Err(anyhow!("not an srlog file: format={}", header.format));
    }
    Ok(header)
}

pub fn record_line(frame: &CanFrame, ts: OffsetDateTime) -> Result<String> {
    let mut data = String::new();
    for b in frame.payload() {
        let _ = core::fmt::Write::write_fmt(&mut data, format_args!("{b:02X}"));
    }
    let rec = Record {
        ts: ts.format(&Rfc3339)?,
        id: format!("0x{:08X}", frame.id),
        len: frame.payload().len(),
        data,
    };
    Ok(serde_json::to_string(&rec)?)
}

/// Parse a record back into a frame and its capture time.
pub fn parse_record(line: &str) -> Result<(CanFrame, Option<OffsetDateTime>)> {
    let rec: Record = serde_json::from_str(line)?;
    let id = crate::parse_id(&rec.id).ok_or_else(|| anyhow!("bad id: {}", rec.id))?;
    let bytes = parse_hex_compact(&rec.data)?;
    if bytes.len() != rec.len {
        return Err(anyhow!("len {} does not match {} data bytes", rec.len, bytes.len()));
    }
    let frame = CanFrame::new(id, &bytes).ok_or_else(|| anyhow!("bad frame len"))?;
    let ts = OffsetDateTime::parse(&rec.ts, &Rfc3339).ok();
    Ok((frame, ts))
}

fn parse_hex_compact(s: &str) -> Result<Vec<u8>> {
    let t = s.trim();
    if t.len() % 2 != 0 {
        return Err(anyhow!("odd hex length"));
    }
    let mut out = Vec::with_capacity(t.len() / 2);
    for pair in t.as_bytes().chunks(2) {
        let s = core::str::from_utf8(pair).map_err(|e| anyhow!("invalid hex: {e}"))?;
        out.push(u8::from_str_radix(s, 16).map_err(|e| anyhow!("invalid hex: {e}"))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_line_format() {
        let frame = CanFrame::new(0x18FF_0102, &[0xAB, 0x01]).unwrap();
        let line = record_line(&frame, datetime!(2024-05-01 12:00:00 UTC)).unwrap();
        assert_eq!(
            line,
            r#"{"ts":"2024-05-01T12:00:00Z","id":"0x18FF0102","len":2,"data":"AB01"}"#
        );
    }

    #[test]
    fn record_parses_back_with_timestamp() {
        let line = r#"{"ts":"2024-05-01T12:00:00.250Z","id":"0x00000123","len":3,"data":"010203"}"#;
        let (frame, ts) = parse_record(line).unwrap();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(ts, Some(datetime!(2024-05-01 12:00:00.25 UTC)));
    }

    #[test]
    fn record_with_mismatched_len_is_rejected() {
        let line = r#"{"ts":"","id":"0x1","len":2,"data":"01"}"#;
        assert!(parse_record(line).is_err());
    }

    #[test]
    fn header_round_trips() {
        let line = header_line(Backend::Nuttx, "/dev/can0").unwrap();
        let header = parse_header(&line).unwrap();
        assert_eq!(header.backend, Backend::Nuttx);
        assert_eq!(header.device, "/dev/can0");
        assert!(parse_header(r#"{"format":"pcap","version":1,"backend":"mock","device":"x"}"#)
            .is_err());
    }

    #[test]
    fn hex_compact_rejects_odd_and_invalid() {
        assert!(parse_hex_compact("ABC").is_err());
        assert!(parse_hex_compact("ZZ").is_err());
        assert_eq!(parse_hex_compact("").unwrap(), Vec::<u8>::new());
    }
}
