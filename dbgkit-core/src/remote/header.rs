//! リモートデバッグヘッダ
//!
//! ```text
//! offset  size  field
//! 0       4     magic "KDBG"
//! 4       2     port       (little-endian)
//! 6       2     port_kind  (little-endian)
//! 8       256   payload
//! ```

use std::io::{self, Read, Write};

/// プロトコルファミリーを識別するマジック
pub const MAGIC: [u8; 4] = *b"KDBG";

/// ペイロードの長さ
pub const PAYLOAD_LEN: usize = 256;

/// ヘッダ全体の長さ
pub const HEADER_LEN: usize = MAGIC.len() + 2 + 2 + PAYLOAD_LEN;

/// どのチャネルにも束縛されていないポート
pub const UNBOUND_PORT: u16 = 0xFEED;

/// リモートデバッグヘッダ
///
/// `port` と `port_kind` はリモート側の論理チャネルを選択します。
/// ペイロードの解釈はコマンドごとに決まります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDebugHeader {
    pub port: u16,
    pub port_kind: u16,
    pub payload: [u8; PAYLOAD_LEN],
}

impl RemoteDebugHeader {
    /// ペイロードをゼロ埋めして作成する
    ///
    /// ペイロードが256バイトを超える場合はNoneを返します。
    pub fn new(port: u16, port_kind: u16, payload: &[u8]) -> Option<Self> {
        if payload.len() > PAYLOAD_LEN {
            return None;
        }
        let mut buf = [0u8; PAYLOAD_LEN];
        buf[..payload.len()].copy_from_slice(payload);
        Some(Self {
            port,
            port_kind,
            payload: buf,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..6].copy_from_slice(&self.port.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.port_kind.to_le_bytes());
        bytes[8..].copy_from_slice(&self.payload);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("debug header must be {} bytes, got {}", HEADER_LEN, bytes.len()),
            ));
        }
        if bytes[0..4] != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad debug header magic {:02x?}", &bytes[0..4]),
            ));
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[8..]);

        Ok(Self {
            port: u16::from_le_bytes([bytes[4], bytes[5]]),
            port_kind: u16::from_le_bytes([bytes[6], bytes[7]]),
            payload,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}
