//! miIO packet framing and payload crypto.
//!
//! Every datagram starts with a 32-byte header:
//!
//! ```text
//! magic(2)=0x2131 | length(2) | reserved(4) | device_id(4) | stamp(4) | checksum(16)
//! ```
//!
//! All integers are big-endian; `length` covers the header plus the
//! encrypted payload. The checksum is MD5 over the whole packet with the
//! token occupying the checksum slot. Payloads are JSON encrypted with
//! AES-128-CBC (PKCS#7), key `md5(token)`, IV `md5(key ‖ token)`.
//!
//! The hello packet is a bare header with length 0x20 and every other
//! field 0xFF; the device answers with a bare header carrying its id and
//! clock stamp.

use aes::cipher::{
    block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use md5::{Digest, Md5};

use super::Token;
use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// UDP port the device listens on.
pub const PORT: u16 = 54321;

pub const HEADER_LEN: usize = 32;

const MAGIC: [u8; 2] = [0x21, 0x31];
const CHECKSUM_OFFSET: usize = 16;
const AES_BLOCK: usize = 16;

/// Header fields of a validated datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u16,
    pub device_id: u32,
    pub stamp: u32,
}

/// The discovery/handshake datagram.
pub fn hello() -> [u8; HEADER_LEN] {
    let mut buf = [0xff; HEADER_LEN];
    buf[..2].copy_from_slice(&MAGIC);
    buf[2..4].copy_from_slice(&(HEADER_LEN as u16).to_be_bytes());
    buf
}

/// Encode an encrypted request datagram.
///
/// Fails when the encrypted payload would push the datagram past what
/// the 16-bit length field can express.
pub fn encode(
    token: &Token,
    device_id: u32,
    stamp: u32,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let ciphertext = Aes128CbcEnc::new(&token.key().into(), &token.iv().into())
        .encrypt_padded_vec_mut::<Pkcs7>(payload);
    if HEADER_LEN + ciphertext.len() > u16::MAX as usize {
        return Err(Error::Protocol(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&((HEADER_LEN + ciphertext.len()) as u16).to_be_bytes());
    buf.extend_from_slice(&[0; 4]);
    buf.extend_from_slice(&device_id.to_be_bytes());
    buf.extend_from_slice(&stamp.to_be_bytes());
    // Token sits in the checksum slot while the digest is computed.
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(&ciphertext);

    let checksum = Md5::digest(&buf);
    buf[CHECKSUM_OFFSET..HEADER_LEN].copy_from_slice(checksum.as_slice());
    Ok(buf)
}

/// Parse a datagram header without touching the payload.
pub fn parse_header(datagram: &[u8]) -> Result<Header> {
    if datagram.len() < HEADER_LEN {
        return Err(Error::Protocol(format!(
            "datagram too short: {} bytes",
            datagram.len()
        )));
    }
    if datagram[..2] != MAGIC {
        return Err(Error::Protocol("bad magic".into()));
    }
    let length = u16::from_be_bytes([datagram[2], datagram[3]]);
    if length as usize != datagram.len() {
        return Err(Error::Protocol(format!(
            "length field {} does not match datagram size {}",
            length,
            datagram.len()
        )));
    }

    Ok(Header {
        length,
        device_id: u32::from_be_bytes(datagram[8..12].try_into().unwrap()),
        stamp: u32::from_be_bytes(datagram[12..16].try_into().unwrap()),
    })
}

/// Decode an inbound datagram: verify the checksum and decrypt the
/// payload. Hello replies (bare headers) yield an empty payload and are
/// not checksummed.
pub fn decode(token: &Token, datagram: &[u8]) -> Result<(Header, Vec<u8>)> {
    let header = parse_header(datagram)?;
    if datagram.len() == HEADER_LEN {
        return Ok((header, Vec::new()));
    }
    if (datagram.len() - HEADER_LEN) % AES_BLOCK != 0 {
        return Err(Error::Protocol("payload is not block-aligned".into()));
    }

    let mut check = datagram.to_vec();
    check[CHECKSUM_OFFSET..HEADER_LEN].copy_from_slice(token.as_bytes());
    if Md5::digest(&check).as_slice()
        != &datagram[CHECKSUM_OFFSET..HEADER_LEN]
    {
        return Err(Error::Protocol("checksum mismatch".into()));
    }

    let mut plaintext =
        Aes128CbcDec::new(&token.key().into(), &token.iv().into())
            .decrypt_padded_vec_mut::<Pkcs7>(&datagram[HEADER_LEN..])
            .map_err(|_| {
                Error::Protocol("payload decryption failed".into())
            })?;

    // Some firmwares terminate the JSON with a stray NUL.
    while plaintext.last() == Some(&0) {
        plaintext.pop();
    }

    Ok((header, plaintext))
}
