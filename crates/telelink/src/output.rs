use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use telelink_transport::{ChannelId, Descriptor, Endpoint, Message};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    channel: u8,
    seq: u8,
    system_id: u8,
    component_id: u8,
    msg_id: u8,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_message(message: &Message, channel: ChannelId, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel: channel.get(),
                seq: message.seq,
                system_id: message.system_id,
                component_id: message.component_id,
                msg_id: message.msg_id,
                payload_size: message.payload.len(),
                payload: hex(&message.payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SEQ", "SYS", "COMP", "MSG", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    channel.to_string(),
                    message.seq.to_string(),
                    message.system_id.to_string(),
                    message.component_id.to_string(),
                    message.msg_id.to_string(),
                    message.payload.len().to_string(),
                    hex(&message.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} seq={} sys={} comp={} msg={} size={} payload={}",
                channel,
                message.seq,
                message.system_id,
                message.component_id,
                message.msg_id,
                message.payload.len(),
                hex(&message.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(&message.payload);
        }
    }
}

#[derive(Serialize)]
struct DescriptorOutput {
    descriptor: String,
    scheme: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    baud: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_id: Option<u8>,
}

impl DescriptorOutput {
    fn from_descriptor(descriptor: &Descriptor) -> Self {
        let mut out = Self {
            descriptor: descriptor.to_string(),
            scheme: descriptor.scheme().as_str(),
            path: None,
            baud: None,
            host: None,
            port: None,
            remote_host: None,
            remote_port: None,
            system_id: descriptor.ids().map(|ids| ids.system_id),
            component_id: descriptor.ids().map(|ids| ids.component_id),
        };
        match descriptor.endpoint() {
            Endpoint::Serial { path, baud } => {
                out.path = Some(path.clone());
                out.baud = Some(*baud);
            }
            Endpoint::Udp { bind, remote } => {
                out.host = Some(bind.host.clone());
                out.port = Some(bind.port);
                out.remote_host = Some(remote.host.clone());
                out.remote_port = Some(remote.port);
            }
            Endpoint::Tcp(addr) | Endpoint::TcpListen(addr) => {
                out.host = Some(addr.host.clone());
                out.port = Some(addr.port);
            }
        }
        out
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("descriptor", self.descriptor.clone()),
            ("scheme", self.scheme.to_string()),
        ];
        let optional = [
            ("path", self.path.clone()),
            ("baud", self.baud.map(|v| v.to_string())),
            ("host", self.host.clone()),
            ("port", self.port.map(|v| v.to_string())),
            ("remote_host", self.remote_host.clone()),
            ("remote_port", self.remote_port.map(|v| v.to_string())),
            ("system_id", self.system_id.map(|v| v.to_string())),
            ("component_id", self.component_id.map(|v| v.to_string())),
        ];
        rows.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value))),
        );
        rows
    }
}

pub fn print_descriptor(descriptor: &Descriptor, format: OutputFormat) {
    let out = DescriptorOutput::from_descriptor(descriptor);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in out.rows() {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, value) in out.rows() {
                println!("{key}={value}");
            }
        }
        OutputFormat::Raw => {
            println!("{}", out.descriptor);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex(&[0x00, 0xab, 0x7]), "00ab07");
    }

    #[test]
    fn udp_descriptor_rows_include_remote() {
        let descriptor = telelink_transport::parse("udp://:14560@10.0.0.2:14550").unwrap();
        let out = DescriptorOutput::from_descriptor(&descriptor);
        let rows = out.rows();
        assert!(rows.contains(&("remote_host", "10.0.0.2".to_string())));
        assert!(rows.contains(&("port", "14560".to_string())));
        assert!(!rows.iter().any(|(key, _)| *key == "baud"));
    }
}
