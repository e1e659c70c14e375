use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use nuttx_can as can;
use nuttx_can::{CanDevice, Outcome};

mod capture;
mod config;

use config::{Backend, Config};

#[derive(Parser, Debug)]
#[command(
    name = "ncan",
    version,
    about = "NuttX CAN device tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// JSON file with default device/backend/timeout
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct Target {
    /// Device node (e.g., /dev/can0)
    #[arg(long)]
    device: Option<String>,
    /// Backend to use
    #[arg(long, value_enum)]
    backend: Option<Backend>,
    /// Readiness timeout in milliseconds (negative waits forever)
    #[arg(long, allow_negative_numbers = true)]
    timeout_ms: Option<i32>,
    /// Kernel built with CONFIG_CAN_ERRORS
    #[arg(long, action = ArgAction::SetTrue)]
    kernel_errors: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a CAN frame
    Send {
        #[command(flatten)]
        target: Target,
        /// CAN ID in hex (e.g., 0x123)
        #[arg(long)]
        id: String,
        /// Data bytes as hex, space-separated (e.g., "01 02 03")
        #[arg(long, value_delimiter = ' ')]
        data: Vec<String>,
        /// Treat a transmit timeout as a failure
        #[arg(long, action = ArgAction::SetTrue)]
        strict: bool,
    },
    /// Receive frames from a CAN device
    Sniff {
        #[command(flatten)]
        target: Target,
        /// Number of frames to read before exiting
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Write frames to .srlog (NDJSON) file
        #[arg(long)]
        to: Option<String>,
    },
    /// Open the device, send a probe frame, listen for a reply and close
    Doctor {
        #[command(flatten)]
        target: Target,
        /// Probe CAN ID in hex (e.g., 0x123)
        #[arg(long, default_value = "0x123")]
        id: String,
        /// Probe data bytes as hex
        #[arg(long, value_delimiter = ' ', default_values_t = vec!["00".to_string(), "00".to_string()])]
        data: Vec<String>,
        /// Milliseconds to listen for a frame after send (0 to skip)
        #[arg(long, default_value_t = 300u32)]
        recv_ms: u32,
    },
    /// Replay frames from an .srlog file; optionally re-send
    Replay {
        #[command(flatten)]
        target: Target,
        /// Path to .srlog file
        #[arg(long)]
        from: String,
        /// Actually send frames back out (otherwise just print)
        #[arg(long, action = ArgAction::SetTrue)]
        send: bool,
        /// Respect timestamps to approximate real-time playback
        #[arg(long, action = ArgAction::SetTrue)]
        realtime: bool,
    },
}

/// Flags merged over the config file.
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    device: String,
    backend: Backend,
    timeout_ms: Option<u32>,
    layout: can::HeaderLayout,
}

impl Target {
    fn resolve(&self, cfg: &Config) -> Resolved {
        let layout = if self.kernel_errors || cfg.kernel_errors {
            can::HeaderLayout::WithErrorBit
        } else {
            can::HeaderLayout::Plain
        };
        Resolved {
            device: self.device.clone().unwrap_or_else(|| cfg.device.clone()),
            backend: self.backend.unwrap_or(cfg.backend),
            timeout_ms: can::compat::timeout_from_millis(self.timeout_ms.unwrap_or(cfg.timeout_ms)),
            layout,
        }
    }
}

enum Bus {
    Mock(can::LoopbackBus),
    Nuttx(can::NuttxCan),
}

impl Bus {
    fn open(target: &Resolved) -> can::Result<Self> {
        Ok(match target.backend {
            Backend::Mock => Bus::Mock(can::LoopbackBus::new()),
            Backend::Nuttx => Bus::Nuttx(can::NuttxCan::open_with(&target.device, target.layout)?),
        })
    }

    fn dev(&mut self) -> &mut dyn CanDevice {
        match self {
            Bus::Mock(b) => b,
            Bus::Nuttx(b) => b,
        }
    }

    fn close(self) -> can::Result<()> {
        match self {
            Bus::Mock(_) => Ok(()),
            Bus::Nuttx(b) => b.close(),
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Send {
            target,
            id,
            data,
            strict,
        } => can_send(&target.resolve(&cfg), &id, &data, strict),
        Commands::Sniff { target, count, to } => {
            can_sniff(&target.resolve(&cfg), count, to.as_deref())
        }
        Commands::Doctor {
            target,
            id,
            data,
            recv_ms,
        } => can_doctor(&target.resolve(&cfg), &id, &data, recv_ms),
        Commands::Replay {
            target,
            from,
            send,
            realtime,
        } => can_replay(&target.resolve(&cfg), &from, send, realtime),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_frame(id_str: &str, data_hex: &[String]) -> Result<can::CanFrame> {
    let id = parse_id(id_str).ok_or_else(|| anyhow::anyhow!("invalid CAN id: {id_str}"))?;
    let bytes = parse_hex_bytes(data_hex)?;
    can::CanFrame::new(id, &bytes).ok_or_else(|| anyhow::anyhow!("invalid frame length"))
}

fn can_send(target: &Resolved, id_str: &str, data_hex: &[String], strict: bool) -> Result<()> {
    let frame = build_frame(id_str, data_hex)?;
    let mut bus = Bus::open(target)?;
    let outcome = bus.dev().transmit(&frame, target.timeout_ms);
    match settle(outcome, bus.close())? {
        Outcome::Ready(()) => info!(device = %target.device, id = frame.id, "sent frame"),
        Outcome::TimedOut if strict => {
            return Err(anyhow::anyhow!("device not writable within timeout"));
        }
        Outcome::TimedOut => warn!(device = %target.device, "transmit timed out"),
    }
    Ok(())
}

/// Combine an I/O result with the close that followed it; the I/O error wins.
fn settle<T>(result: can::Result<T>, closed: can::Result<()>) -> Result<T> {
    match (result, closed) {
        (Ok(v), closed) => {
            closed?;
            Ok(v)
        }
        (Err(e), Err(close_err)) => {
            error!("close after failed transfer also failed: {close_err}");
            Err(e.into())
        }
        (Err(e), Ok(())) => Err(e.into()),
    }
}

fn can_sniff(target: &Resolved, count: u32, to: Option<&str>) -> Result<()> {
    let mut writer = match to {
        Some(path) => {
            let mut w = BufWriter::new(File::create(path)?);
            w.write_all(capture::header_line(target.backend, &target.device)?.as_bytes())?;
            w.write_all(b"\n")?;
            Some(w)
        }
        None => None,
    };

    let mut bus = Bus::open(target)?;
    let mut seen = 0;
    while seen < count {
        let frame = match bus.dev().receive(target.timeout_ms)? {
            Outcome::Ready(f) => f,
            Outcome::TimedOut => {
                // Nothing will ever show up on an idle loopback.
                if target.backend == Backend::Mock {
                    break;
                }
                continue;
            }
        };
        let ts = OffsetDateTime::now_utc();
        print_frame(&frame, ts);
        if let Some(w) = writer.as_mut() {
            w.write_all(capture::record_line(&frame, ts)?.as_bytes())?;
            w.write_all(b"\n")?;
        }
        seen += 1;
    }
    if let Some(mut w) = writer {
        w.flush()?;
    }
    bus.close()?;
    Ok(())
}

fn can_doctor(target: &Resolved, id_str: &str, data_hex: &[String], recv_ms: u32) -> Result<()> {
    let frame = build_frame(id_str, data_hex)?;

    println!(
        "doctor: backend={:?} device={} layout={:?}",
        target.backend, target.device, target.layout
    );
    let mut bus = Bus::open(target)?;
    match &bus {
        Bus::Nuttx(b) => println!("open: ok (fd {})", b.handle()),
        Bus::Mock(_) => println!("open: ok"),
    }
    match bus.dev().transmit(&frame, target.timeout_ms)? {
        Outcome::Ready(()) => println!("{}", send_summary(&frame)),
        Outcome::TimedOut => println!("send: device not writable within timeout"),
    }
    if recv_ms > 0 {
        match bus.dev().receive(Some(recv_ms)) {
            Ok(Outcome::Ready(f)) => {
                print!("recv: ");
                print_frame(&f, OffsetDateTime::now_utc());
            }
            Ok(Outcome::TimedOut) => eprintln!("recv: no frame within {recv_ms} ms"),
            Err(e) => eprintln!("recv: {e} ({:?})", e.kind()),
        }
    }
    bus.close()?;
    println!("close: ok");
    println!("doctor: done");
    Ok(())
}

fn send_summary(frame: &can::CanFrame) -> String {
    format!(
        "send: ok ({} payload bytes, {} on the wire)",
        frame.len,
        can::msg::msg_len(frame.len)
    )
}

fn can_replay(target: &Resolved, path: &str, send: bool, realtime: bool) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut first = String::new();
    let _ = reader.read_line(&mut first)?;
    let header = match capture::parse_header(&first) {
        Ok(h) => h,
        Err(e) => {
            error!("invalid srlog header: {e}");
            return Err(anyhow::anyhow!("invalid srlog header"));
        }
    };
    println!(
        "replay: {path} (captured on {}) backend={:?} device={} send={send} realtime={realtime}",
        header.device, target.backend, target.device
    );

    let mut bus = if send { Some(Bus::open(target)?) } else { None };

    let mut last_ts: Option<OffsetDateTime> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (frame, ts) = match capture::parse_record(&line) {
            Ok(r) => r,
            Err(e) => {
                error!("bad record: {e}");
                continue;
            }
        };

        if realtime {
            if let (Some(prev), Some(ts)) = (last_ts, ts) {
                let ms = (ts - prev).whole_milliseconds().max(0) as u64;
                if ms > 0 {
                    thread::sleep(Duration::from_millis(ms));
                }
            }
            last_ts = ts.or(last_ts);
        }

        print_frame(&frame, ts.unwrap_or_else(OffsetDateTime::now_utc));
        if let Some(b) = bus.as_mut() {
            if b.dev().transmit(&frame, target.timeout_ms)?.is_timed_out() {
                warn!(id = frame.id, "transmit timed out, frame dropped");
            }
            // Keep the loopback slot free for the next frame.
            if let Bus::Mock(m) = b {
                let _ = m.receive(Some(0))?;
            }
        }
    }
    if let Some(b) = bus {
        b.close()?;
    }
    println!("replay: done");
    Ok(())
}

fn parse_id(s: &str) -> Option<u32> {
    let s_trim = s.trim();
    let no_prefix = s_trim.strip_prefix("0x").unwrap_or(s_trim);
    let parsed = u32::from_str_radix(no_prefix, 16).ok()?;
    (parsed <= can::MAX_EXTENDED_ID).then_some(parsed)
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len());
    for s in items {
        let t = s.trim();
        if t.is_empty() {
            continue;
        }
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}

fn print_frame(f: &can::CanFrame, ts: OffsetDateTime) {
    let ts = ts
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    println!("{f}\t{ts}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_prefixed_and_bare_hex() {
        assert_eq!(parse_id("0x123"), Some(0x123));
        assert_eq!(parse_id("1FFFFFFF"), Some(0x1FFF_FFFF));
        assert_eq!(parse_id("0x20000000"), None);
        assert_eq!(parse_id("xyz"), None);
    }

    #[test]
    fn parse_hex_bytes_skips_blanks() {
        let items = vec!["01".to_string(), "".to_string(), "0xff".to_string()];
        assert_eq!(parse_hex_bytes(&items).unwrap(), vec![0x01, 0xFF]);
        assert!(parse_hex_bytes(&["zz".to_string()]).is_err());
    }

    #[test]
    fn build_frame_rejects_nine_bytes() {
        let data: Vec<String> = (0..9).map(|i| format!("{i:02X}")).collect();
        assert!(build_frame("0x10", &data).is_err());
        assert_eq!(build_frame("0x10", &data[..8]).unwrap().len, 8);
    }

    #[test]
    fn flags_override_config() {
        let cfg = Config::default();
        let target = Target {
            device: Some("/dev/can3".to_string()),
            backend: None,
            timeout_ms: Some(-1),
            kernel_errors: true,
        };
        let r = target.resolve(&cfg);
        assert_eq!(r.device, "/dev/can3");
        assert_eq!(r.backend, Backend::Nuttx);
        assert_eq!(r.timeout_ms, None);
        assert_eq!(r.layout, can::HeaderLayout::WithErrorBit);

        let r = Target::default().resolve(&cfg);
        assert_eq!(r.device, "/dev/can0");
        assert_eq!(r.timeout_ms, Some(500));
        assert_eq!(r.layout, can::HeaderLayout::Plain);
    }

    #[test]
    fn transfer_error_wins_over_close_error() {
        let closing = || can::Error::ReadinessMismatch { expected: "write" };
        let err = settle::<()>(Err(can::Error::BadLength(2)), Err(closing())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<can::Error>(),
            Some(can::Error::BadLength(2))
        ));

        let err = settle(Ok(()), Err(closing())).unwrap_err();
        assert_eq!(
            err.downcast_ref::<can::Error>().map(|e| e.kind()),
            Some(can::ErrorKind::ReadinessMismatch)
        );
        assert_eq!(settle(Ok(7), Ok(())).unwrap(), 7);
    }

    #[test]
    fn send_summary_reports_wire_length() {
        let frame = can::CanFrame::new(0x42, &[1, 2]).unwrap();
        assert_eq!(send_summary(&frame), "send: ok (2 payload bytes, 7 on the wire)");
    }

    #[test]
    fn mock_send_and_doctor_succeed() {
        let target = Resolved {
            device: "mock0".to_string(),
            backend: Backend::Mock,
            timeout_ms: Some(0),
            layout: can::HeaderLayout::Plain,
        };
        can_send(&target, "0x42", &["01".to_string()], true).unwrap();
        can_doctor(&target, "0x42", &["01".to_string()], 10).unwrap();
    }

    #[test]
    fn replay_prints_capture_without_sending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.srlog");
        let frame = can::CanFrame::new(0x77, &[1, 2]).unwrap();
        let body = format!(
            "{}\n{}\nnot json\n",
            capture::header_line(Backend::Mock, "mock0").unwrap(),
            capture::record_line(&frame, OffsetDateTime::now_utc()).unwrap()
        );
        std::fs::write(&path, body).unwrap();
        let target = Target::default().resolve(&Config::default());
        can_replay(&target, path.to_str().unwrap(), false, false).unwrap();
    }
}
