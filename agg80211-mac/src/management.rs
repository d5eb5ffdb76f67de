#![forbid(unsafe_code)]

//! Block-ack action frames (ADDBA request/response, DELBA).
//!
//! Bodies follow IEEE 802.11-2016 §9.6.5: a category octet, an action octet
//! and little-endian fixed fields. Frames of any other category or action
//! parse into [`ActionBody::Unknown`] so callers can count and drop them.

use agg80211_core::MacAddress;
use nom::{
    bytes::complete::take,
    combinator::rest,
    number::complete::{le_u16, u8 as parse_u8},
    IResult,
};

/// Action category of block-ack frames.
pub const CATEGORY_BLOCK_ACK: u8 = 3;

pub const ACTION_ADDBA_REQUEST: u8 = 0;
pub const ACTION_ADDBA_RESPONSE: u8 = 1;
pub const ACTION_DELBA: u8 = 2;

/// ADDBA response status: success.
pub const STATUS_SUCCESS: u16 = 0;
/// ADDBA response status: request declined.
pub const STATUS_REQUEST_DECLINED: u16 = 37;

/// DELBA reason: originator has nothing left to send.
pub const REASON_END_BA: u16 = 37;
/// DELBA reason: session timed out.
pub const REASON_TIMEOUT: u16 = 39;

/// Length of a serialized ADDBA request body.
pub const ADDBA_REQUEST_LEN: usize = 9;
/// Length of a serialized ADDBA response body.
pub const ADDBA_RESPONSE_LEN: usize = 9;
/// Length of a serialized DELBA body.
pub const DELBA_LEN: usize = 6;

/// Block Ack Parameter Set field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaParameterSet {
    pub amsdu_supported: bool,
    pub immediate_policy: bool,
    pub tid: u8,
    pub buffer_size: u16,
}

impl BaParameterSet {
    pub fn to_u16(self) -> u16 {
        (self.amsdu_supported as u16)
            | (self.immediate_policy as u16) << 1
            | ((self.tid as u16) & 0x0F) << 2
            | (self.buffer_size & 0x3FF) << 6
    }

    pub fn from_u16(raw: u16) -> Self {
        Self {
            amsdu_supported: raw & 0x0001 != 0,
            immediate_policy: raw & 0x0002 != 0,
            tid: ((raw >> 2) & 0x0F) as u8,
            buffer_size: raw >> 6,
        }
    }
}

/// Starting Sequence Control: fragment number (always zero here) and sequence number.
fn seq_control(seq: u16) -> u16 {
    (seq & 0x0FFF) << 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaRequest {
    pub dialog_token: u8,
    pub params: BaParameterSet,
    /// Block ack timeout in TUs; zero disables it.
    pub timeout_tu: u16,
    pub starting_seq: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaResponse {
    pub dialog_token: u8,
    pub status: u16,
    pub params: BaParameterSet,
    pub timeout_tu: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delba {
    pub initiator: bool,
    pub tid: u8,
    pub reason: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionBody {
    AddbaRequest(AddbaRequest),
    AddbaResponse(AddbaResponse),
    Delba(Delba),
    Unknown { category: u8, action: u8, body: Vec<u8> },
}

impl ActionBody {
    pub fn name(&self) -> &'static str {
        match self {
            ActionBody::AddbaRequest(_) => "ADDBA_REQ",
            ActionBody::AddbaResponse(_) => "ADDBA_RESP",
            ActionBody::Delba(_) => "DELBA",
            ActionBody::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// Management action frame with its addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtFrame {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub body: ActionBody,
}

impl MgmtFrame {
    pub fn new(receiver: MacAddress, transmitter: MacAddress, body: ActionBody) -> Self {
        Self { receiver, transmitter, body }
    }

    pub fn delba(
        receiver: MacAddress,
        transmitter: MacAddress,
        initiator: bool,
        tid: u8,
        reason: u16,
    ) -> Self {
        Self::new(receiver, transmitter, ActionBody::Delba(Delba { initiator, tid, reason }))
    }

    /// Serialized action body.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_action(&self.body)
    }
}

/// Serialize an action body.
pub fn build_action(body: &ActionBody) -> Vec<u8> {
    match body {
        ActionBody::AddbaRequest(req) => {
            let mut out = Vec::with_capacity(ADDBA_REQUEST_LEN);
            out.push(CATEGORY_BLOCK_ACK);
            out.push(ACTION_ADDBA_REQUEST);
            out.push(req.dialog_token);
            out.extend_from_slice(&req.params.to_u16().to_le_bytes());
            out.extend_from_slice(&req.timeout_tu.to_le_bytes());
            out.extend_from_slice(&seq_control(req.starting_seq).to_le_bytes());
            out
        }
        ActionBody::AddbaResponse(resp) => {
            let mut out = Vec::with_capacity(ADDBA_RESPONSE_LEN);
            out.push(CATEGORY_BLOCK_ACK);
            out.push(ACTION_ADDBA_RESPONSE);
            out.push(resp.dialog_token);
            out.extend_from_slice(&resp.status.to_le_bytes());
            out.extend_from_slice(&resp.params.to_u16().to_le_bytes());
            out.extend_from_slice(&resp.timeout_tu.to_le_bytes());
            out
        }
        ActionBody::Delba(d) => {
            let params = (d.initiator as u16) << 11 | ((d.tid as u16) & 0x0F) << 12;
            let mut out = Vec::with_capacity(DELBA_LEN);
            out.push(CATEGORY_BLOCK_ACK);
            out.push(ACTION_DELBA);
            out.extend_from_slice(&params.to_le_bytes());
            out.extend_from_slice(&d.reason.to_le_bytes());
            out
        }
        ActionBody::Unknown { category, action, body } => {
            let mut out = Vec::with_capacity(2 + body.len());
            out.push(*category);
            out.push(*action);
            out.extend_from_slice(body);
            out
        }
    }
}

fn parse_addba_request(input: &[u8]) -> IResult<&[u8], AddbaRequest> {
    let (input, dialog_token) = parse_u8(input)?;
    let (input, params) = le_u16(input)?;
    let (input, timeout_tu) = le_u16(input)?;
    let (input, ssc) = le_u16(input)?;
    Ok((
        input,
        AddbaRequest {
            dialog_token,
            params: BaParameterSet::from_u16(params),
            timeout_tu,
            starting_seq: ssc >> 4,
        },
    ))
}

fn parse_addba_response(input: &[u8]) -> IResult<&[u8], AddbaResponse> {
    let (input, dialog_token) = parse_u8(input)?;
    let (input, status) = le_u16(input)?;
    let (input, params) = le_u16(input)?;
    let (input, timeout_tu) = le_u16(input)?;
    let params = BaParameterSet::from_u16(params);
    Ok((input, AddbaResponse { dialog_token, status, params, timeout_tu }))
}

fn parse_delba(input: &[u8]) -> IResult<&[u8], Delba> {
    let (input, params) = le_u16(input)?;
    let (input, reason) = le_u16(input)?;
    Ok((input, Delba { initiator: params & 0x0800 != 0, tid: (params >> 12) as u8, reason }))
}

/// Parse an action body. Unrecognised category/action pairs are returned as
/// [`ActionBody::Unknown`]; truncated block-ack bodies are parse errors.
pub fn parse_action(input: &[u8]) -> IResult<&[u8], ActionBody> {
    let (input, category) = parse_u8(input)?;
    let (input, action) = parse_u8(input)?;
    match (category, action) {
        (CATEGORY_BLOCK_ACK, ACTION_ADDBA_REQUEST) => {
            let (input, req) = parse_addba_request(input)?;
            Ok((input, ActionBody::AddbaRequest(req)))
        }
        (CATEGORY_BLOCK_ACK, ACTION_ADDBA_RESPONSE) => {
            let (input, resp) = parse_addba_response(input)?;
            Ok((input, ActionBody::AddbaResponse(resp)))
        }
        (CATEGORY_BLOCK_ACK, ACTION_DELBA) => {
            let (input, d) = parse_delba(input)?;
            Ok((input, ActionBody::Delba(d)))
        }
        _ => {
            let (input, body) = rest(input)?;
            Ok((input, ActionBody::Unknown { category, action, body: body.to_vec() }))
        }
    }
}

/// Parse exactly `len` octets as an action body.
pub fn parse_action_exact(input: &[u8], len: usize) -> IResult<&[u8], ActionBody> {
    let (remaining, body) = take(len)(input)?;
    let (_, parsed) = parse_action(body)?;
    Ok((remaining, parsed))
}
