// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SNMP scan: a minimal hand-rolled SNMPv2c GET-request encoder/decoder over
//! UDP/161, enough to fetch `sysDescr`/`sysName` from a host that answers.
//! The spec deliberately leaves the SNMP implementation unspecified (§1:
//! "does not prescribe how the agent's probes are implemented internally,
//! e.g. which SNMP library") and no crate in the retrieved pack provides one,
//! so this is a small purpose-built BER encoder rather than a borrowed
//! general-purpose ASN.1 stack.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use super::{Cidr, DeviceSource, Record};
use crate::config::AgentConfig;
use crate::error::AgentError;

const SYS_DESCR_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];
const SYS_NAME_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];
const COMMUNITY: &str = "public";
const MAX_CONCURRENT: usize = 16;

pub async fn scan(network: Cidr, config: &AgentConfig) -> Result<Vec<Record>, AgentError> {
    let hosts = network.hosts();
    let timeout = config.probe_timeout();

    let mut records = Vec::new();
    for chunk in hosts.chunks(MAX_CONCURRENT) {
        let mut tasks = Vec::with_capacity(chunk.len());
        for &addr in chunk {
            tasks.push(tokio::spawn(async move { (addr, query(addr, timeout).await) }));
        }
        for task in tasks {
            if let Ok((addr, Ok(Some((descr, name))))) = task.await {
                records.push(Record {
                    address: addr.to_string(),
                    hostname: name,
                    platform: descr,
                    source: Some(DeviceSource::Snmp),
                    ..Default::default()
                });
            }
        }
    }
    Ok(records)
}

async fn query(addr: Ipv4Addr, timeout: Duration) -> Result<Option<(Option<String>, Option<String>)>, AgentError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    let request = ber::encode_get_request(COMMUNITY, 1, &[SYS_DESCR_OID, SYS_NAME_OID]);
    socket.send_to(&request, SocketAddr::from((addr, 161))).await?;

    let mut buf = [0u8; 1500];
    let received = tokio::time::timeout(timeout, socket.recv(&mut buf)).await;
    let Ok(Ok(n)) = received else { return Ok(None) };

    let bindings = ber::decode_get_response(&buf[..n]).map_err(AgentError::vendor_protocol)?;
    let descr = bindings.iter().find(|(oid, _)| oid == SYS_DESCR_OID).and_then(|(_, v)| v.clone());
    let name = bindings.iter().find(|(oid, _)| oid == SYS_NAME_OID).and_then(|(_, v)| v.clone());
    Ok(Some((descr, name)))
}

/// Minimal BER encode/decode for exactly the SNMPv2c GET-request shapes this
/// module needs: INTEGER, OCTET STRING, NULL, OBJECT IDENTIFIER, SEQUENCE.
mod ber {
    const TAG_INTEGER: u8 = 0x02;
    const TAG_OCTET_STRING: u8 = 0x04;
    const TAG_NULL: u8 = 0x05;
    const TAG_OID: u8 = 0x06;
    const TAG_SEQUENCE: u8 = 0x30;
    const TAG_GET_REQUEST: u8 = 0xA0;

    fn encode_len(len: usize, out: &mut Vec<u8>) {
        if len < 0x80 {
            out.push(len as u8);
        } else {
            let bytes = len.to_be_bytes();
            let trimmed: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
            out.push(0x80 | trimmed.len() as u8);
            out.extend_from_slice(&trimmed);
        }
    }

    fn tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
        out.push(tag);
        encode_len(content.len(), out);
        out.extend_from_slice(content);
    }

    fn encode_integer(value: i64) -> Vec<u8> {
        if value == 0 {
            return vec![0];
        }
        let mut bytes = value.to_be_bytes().to_vec();
        while bytes.len() > 1 && ((bytes[0] == 0 && bytes[1] & 0x80 == 0) || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0))
        {
            bytes.remove(0);
        }
        bytes
    }

    fn encode_oid(oid: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        if oid.len() >= 2 {
            out.push((oid[0] * 40 + oid[1]) as u8);
            for &component in &oid[2..] {
                out.extend(encode_base128(component));
            }
        }
        out
    }

    fn encode_base128(mut value: u32) -> Vec<u8> {
        let mut stack = vec![(value & 0x7F) as u8];
        value >>= 7;
        while value > 0 {
            stack.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        stack.reverse();
        stack
    }

    pub fn encode_get_request(community: &str, request_id: i32, oids: &[&[u32]]) -> Vec<u8> {
        let mut bindings = Vec::new();
        for oid in oids {
            let mut binding = Vec::new();
            tlv(TAG_OID, &encode_oid(oid), &mut binding);
            tlv(TAG_NULL, &[], &mut binding);
            let mut seq = Vec::new();
            tlv(TAG_SEQUENCE, &binding, &mut seq);
            bindings.extend(seq);
        }
        let mut varbind_list = Vec::new();
        tlv(TAG_SEQUENCE, &bindings, &mut varbind_list);

        let mut pdu = Vec::new();
        tlv(TAG_INTEGER, &encode_integer(request_id as i64), &mut pdu);
        tlv(TAG_INTEGER, &encode_integer(0), &mut pdu);
        tlv(TAG_INTEGER, &encode_integer(0), &mut pdu);
        pdu.extend(varbind_list);

        let mut pdu_tlv = Vec::new();
        tlv(TAG_GET_REQUEST, &pdu, &mut pdu_tlv);

        let mut message = Vec::new();
        tlv(TAG_INTEGER, &encode_integer(1), &mut message); // SNMPv2c
        tlv(TAG_OCTET_STRING, community.as_bytes(), &mut message);
        message.extend(pdu_tlv);

        let mut out = Vec::new();
        tlv(TAG_SEQUENCE, &message, &mut out);
        out
    }

    struct Cursor<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> Cursor<'a> {
        fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), String> {
            if self.pos >= self.data.len() {
                return Err("unexpected end of buffer".to_owned());
            }
            let tag = self.data[self.pos];
            self.pos += 1;
            let first_len = *self.data.get(self.pos).ok_or("truncated length")?;
            self.pos += 1;
            let len = if first_len & 0x80 == 0 {
                first_len as usize
            } else {
                let n = (first_len & 0x7F) as usize;
                let bytes = self.data.get(self.pos..self.pos + n).ok_or("truncated long-form length")?;
                self.pos += n;
                bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
            };
            let content = self.data.get(self.pos..self.pos + len).ok_or("truncated content")?;
            self.pos += len;
            Ok((tag, content))
        }
    }

    fn decode_oid(bytes: &[u8]) -> Vec<u32> {
        let mut out = Vec::new();
        if let Some(&first) = bytes.first() {
            out.push((first / 40) as u32);
            out.push((first % 40) as u32);
        }
        let mut value = 0u32;
        for &byte in bytes.iter().skip(1) {
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                out.push(value);
                value = 0;
            }
        }
        out
    }

    /// Decode a GetResponse PDU into its (oid, value) bindings. Only
    /// OCTET STRING values are surfaced as `Some`; anything else (e.g. an
    /// `Integer32` counter, or a `noSuchObject` exception value) decodes to
    /// `None` for that binding rather than failing the whole response.
    pub fn decode_get_response(buf: &[u8]) -> Result<Vec<(Vec<u32>, Option<String>)>, String> {
        let mut top = Cursor { data: buf, pos: 0 };
        let (_, message) = top.read_tlv()?;

        let mut cursor = Cursor { data: message, pos: 0 };
        let _version = cursor.read_tlv()?;
        let _community = cursor.read_tlv()?;
        let (_pdu_tag, pdu) = cursor.read_tlv()?;

        let mut pdu_cursor = Cursor { data: pdu, pos: 0 };
        let _request_id = pdu_cursor.read_tlv()?;
        let _error_status = pdu_cursor.read_tlv()?;
        let _error_index = pdu_cursor.read_tlv()?;
        let (_, varbinds) = pdu_cursor.read_tlv()?;

        let mut varbind_cursor = Cursor { data: varbinds, pos: 0 };
        let mut out = Vec::new();
        while varbind_cursor.pos < varbinds.len() {
            let (_, binding) = varbind_cursor.read_tlv()?;
            let mut bc = Cursor { data: binding, pos: 0 };
            let (_, oid_bytes) = bc.read_tlv()?;
            let (value_tag, value_bytes) = bc.read_tlv()?;
            let value = if value_tag == TAG_OCTET_STRING {
                Some(String::from_utf8_lossy(value_bytes).into_owned())
            } else {
                None
            };
            out.push((decode_oid(oid_bytes), value));
        }
        Ok(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn oid_round_trips() {
            let oid = [1, 3, 6, 1, 2, 1, 1, 1, 0];
            let encoded = encode_oid(&oid);
            assert_eq!(decode_oid(&encoded), oid);
        }

        #[test]
        fn request_starts_with_sequence_tag() {
            let request = encode_get_request("public", 1, &[&[1, 3, 6, 1, 2, 1, 1, 1, 0]]);
            assert_eq!(request[0], TAG_SEQUENCE);
        }

        #[test]
        fn decodes_a_handcrafted_octet_string_response() {
            // SEQUENCE { INTEGER version=1, OCTET STRING "public",
            //   [2] GetResponse { INTEGER reqid=1, INTEGER 0, INTEGER 0,
            //     SEQUENCE { SEQUENCE { OID sysDescr, OCTET STRING "hi" } } } }
            let mut binding = Vec::new();
            tlv(TAG_OID, &encode_oid(&[1, 3, 6, 1, 2, 1, 1, 1, 0]), &mut binding);
            tlv(TAG_OCTET_STRING, b"hi", &mut binding);
            let mut binding_seq = Vec::new();
            tlv(TAG_SEQUENCE, &binding, &mut binding_seq);
            let mut varbinds = Vec::new();
            tlv(TAG_SEQUENCE, &binding_seq, &mut varbinds);

            let mut pdu = Vec::new();
            tlv(TAG_INTEGER, &encode_integer(1), &mut pdu);
            tlv(TAG_INTEGER, &encode_integer(0), &mut pdu);
            tlv(TAG_INTEGER, &encode_integer(0), &mut pdu);
            pdu.extend(varbinds);
            let mut pdu_tlv = Vec::new();
            tlv(0xA2, &pdu, &mut pdu_tlv);

            let mut message = Vec::new();
            tlv(TAG_INTEGER, &encode_integer(1), &mut message);
            tlv(TAG_OCTET_STRING, b"public", &mut message);
            message.extend(pdu_tlv);

            let mut out = Vec::new();
            tlv(TAG_SEQUENCE, &message, &mut out);

            let bindings = decode_get_response(&out).unwrap();
            assert_eq!(bindings.len(), 1);
            assert_eq!(bindings[0].1.as_deref(), Some("hi"));
        }
    }
}
