use std::fs;
use std::thread;

use telelink_transport::{ConnectionFactory, Identity};
use tracing::info;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{link_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};

pub fn run(args: SendArgs, identity: Identity) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let payload = resolve_payload(&args)?;
    if payload.len() > telelink_frame::MAX_PAYLOAD {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload is {} bytes, at most {} allowed",
                payload.len(),
                telelink_frame::MAX_PAYLOAD
            ),
        ));
    }

    let conn = ConnectionFactory::shared()
        .open(&args.url, identity.system_id, identity.component_id)
        .map_err(|err| link_error("open failed", &err))?;

    for i in 0..args.count {
        if i > 0 {
            thread::sleep(interval);
        }
        conn.send_message(args.msg_id, &payload)
            .map_err(|err| link_error("send failed", &err))?;
    }

    conn.close();
    let stats = conn.stats();
    info!(
        sent = stats.tx_frames,
        dropped = stats.tx_dropped,
        bytes = stats.tx_bytes,
        "send complete"
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), &err)
        });
    }
    Ok(Vec::new())
}

fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("--hex is not valid hex: {input}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_hex_accepts_spaced_pairs() {
        assert_eq!(decode_hex("de ad BE ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_hex_rejects_bad_input() {
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }
}
