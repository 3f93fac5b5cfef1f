//! # rkv
//!
//! Issue one raw command and print the reply.
//!
//! ```text
//! rkv <addr> <verb> [args...]
//! RKV_CONFIG=client.json rkv <addr> GET key
//! RUST_LOG=rkv_client=debug rkv 127.0.0.1:6379 PING
//! ```

use std::env;
use std::fmt::Write as _;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use rkv_client::{ClientConfig, Command, KvClient, Reply};

const USAGE: &str = "usage: rkv <addr> <verb> [args...]";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let addr = args.next().context(USAGE)?;
    let verb = args.next().context(USAGE)?;
    let command = Command::new(verb).args(args);

    let mut config = match env::var("RKV_CONFIG") {
        Ok(path) => ClientConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => ClientConfig::default(),
    };
    // The address on the command line wins over the configured list.
    config.addresses.retain(|configured| configured != &addr);
    config.addresses.insert(0, addr.clone());

    let client = KvClient::with_config(config).context("building client")?;
    let reply = client
        .execute(&command)
        .with_context(|| format!("executing command against {}", addr))?;

    let mut out = String::new();
    format_reply(&reply, 0, &mut out);
    print!("{}", out);

    client.close();
    if let Reply::Error(_) = reply {
        bail!("server rejected the command");
    }
    Ok(())
}

/// Renders a reply the way interactive RESP shells do.
fn format_reply(reply: &Reply, indent: usize, out: &mut String) {
    match reply {
        Reply::Status(text) => {
            let _ = writeln!(out, "{}", String::from_utf8_lossy(text));
        }
        Reply::Error(err) => {
            let _ = writeln!(out, "(error) {}", err);
        }
        Reply::Integer(value) => {
            let _ = writeln!(out, "(integer) {}", value);
        }
        Reply::Bulk(None) | Reply::Array(None) => out.push_str("(nil)\n"),
        Reply::Bulk(Some(data)) => {
            let _ = writeln!(out, "{:?}", String::from_utf8_lossy(data));
        }
        Reply::Array(Some(items)) if items.is_empty() => out.push_str("(empty array)\n"),
        Reply::Array(Some(items)) => {
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                let label = format!("{}) ", idx + 1);
                out.push_str(&label);
                format_reply(item, indent + label.len(), out);
            }
        }
    }
}
