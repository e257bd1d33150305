//! Wire protocol shared between client and server.
//!
//! Frames are `i32 tag | i32 body_len | body`, big-endian throughout.
//! A request body is `i32 request_id | u8 opcode | payload`; a response body
//! is `i32 request_id | u8 status | payload-or-error-string`. The outer tag
//! is the only correlation mechanism; the inner `request_id` is written as
//! zero by clients and treated as opaque.
//!
//! Payload shapes are closed per opcode and enforced here, nowhere else.

use crate::defs::MAX_FRAME_BYTES;
use crate::errors::ProtocolError;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Operation codes carried in the request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Create a new user account.
    Register = 0x01,
    /// Authenticate this connection.
    Login = 0x02,
    /// Drop this connection's authentication.
    Logout = 0x03,
    /// Append a sales event to the current day.
    AddEvent = 0x04,
    /// Total quantity sold over the last N completed days.
    QuantitySold = 0x05,
    /// Total revenue over the last N completed days.
    SalesVolume = 0x06,
    /// Quantity-weighted average price over the last N completed days.
    AveragePrice = 0x07,
    /// Maximum unit price over the last N completed days.
    MaxPrice = 0x08,
    /// Events of one day, optionally filtered by product.
    FilterEvents = 0x09,
    /// Block until two products have both sold in the current day.
    SimultaneousSales = 0x0A,
    /// Block until N consecutive events share a product.
    ConsecutiveSales = 0x0B,
    /// Rotate the current day into history.
    NewDay = 0x0C,
}

impl OpCode {
    /// Human-readable operation name, for logs.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Register => "REGISTER",
            OpCode::Login => "LOGIN",
            OpCode::Logout => "LOGOUT",
            OpCode::AddEvent => "ADD_EVENT",
            OpCode::QuantitySold => "QUANTITY_SOLD",
            OpCode::SalesVolume => "SALES_VOLUME",
            OpCode::AveragePrice => "AVERAGE_PRICE",
            OpCode::MaxPrice => "MAX_PRICE",
            OpCode::FilterEvents => "FILTER_EVENTS",
            OpCode::SimultaneousSales => "SIMULTANEOUS_SALES",
            OpCode::ConsecutiveSales => "CONSECUTIVE_SALES",
            OpCode::NewDay => "NEW_DAY",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(OpCode::Register),
            0x02 => Ok(OpCode::Login),
            0x03 => Ok(OpCode::Logout),
            0x04 => Ok(OpCode::AddEvent),
            0x05 => Ok(OpCode::QuantitySold),
            0x06 => Ok(OpCode::SalesVolume),
            0x07 => Ok(OpCode::AveragePrice),
            0x08 => Ok(OpCode::MaxPrice),
            0x09 => Ok(OpCode::FilterEvents),
            0x0A => Ok(OpCode::SimultaneousSales),
            0x0B => Ok(OpCode::ConsecutiveSales),
            0x0C => Ok(OpCode::NewDay),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Status codes carried in the response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Success; an operation-specific payload follows.
    Ok = 0x00,
    /// Generic failure; an error message follows.
    Error = 0x01,
    /// Credentials were rejected.
    AuthFailed = 0x02,
    /// The operation requires a prior LOGIN.
    NotAuthenticated = 0x03,
    /// Registration failed because the username is taken.
    UserExists = 0x04,
    /// A parameter was missing or out of range.
    InvalidParams = 0x05,
}

impl Status {
    /// Human-readable status name, for logs and client errors.
    pub fn name(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::AuthFailed => "AUTH_FAILED",
            Status::NotAuthenticated => "NOT_AUTHENTICATED",
            Status::UserExists => "USER_EXISTS",
            Status::InvalidParams => "INVALID_PARAMS",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Error),
            0x02 => Ok(Status::AuthFailed),
            0x03 => Ok(Status::NotAuthenticated),
            0x04 => Ok(Status::UserExists),
            0x05 => Ok(Status::InvalidParams),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }
}

/// A single immutable sales event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Product name.
    pub product: String,
    /// Units sold. Never negative.
    pub quantity: i32,
    /// Unit price. Never negative.
    pub price: f64,
    /// Creation time in milliseconds since the UNIX epoch.
    pub timestamp: i64,
}

impl Event {
    /// Creates an event stamped with the current system time.
    pub fn new(product: &str, quantity: i32, price: f64) -> Self {
        Event {
            product: product.to_string(),
            quantity,
            price,
            timestamp: now_millis(),
        }
    }

    /// Creates an event with an explicit timestamp (recovery, replay).
    pub fn with_timestamp(product: &str, quantity: i32, price: f64, timestamp: i64) -> Self {
        Event {
            product: product.to_string(),
            quantity,
            price,
            timestamp,
        }
    }

    /// `quantity × price`.
    pub fn total_value(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A decoded client request. One variant per opcode; payload shapes are
/// fixed here and nowhere else.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Create an account.
    Register {
        /// Account name.
        username: String,
        /// Clear-text password (hashed server-side).
        password: String,
    },
    /// Authenticate the connection.
    Login {
        /// Account name.
        username: String,
        /// Clear-text password.
        password: String,
    },
    /// Drop the connection's authentication.
    Logout,
    /// Append a sales event to the current day.
    AddEvent {
        /// Product name.
        product: String,
        /// Units sold.
        quantity: i32,
        /// Unit price.
        price: f64,
    },
    /// Quantity aggregation over the last `days` completed days.
    QuantitySold {
        /// Product name.
        product: String,
        /// Window size in completed days.
        days: i32,
    },
    /// Revenue aggregation.
    SalesVolume {
        /// Product name.
        product: String,
        /// Window size in completed days.
        days: i32,
    },
    /// Average-price aggregation.
    AveragePrice {
        /// Product name.
        product: String,
        /// Window size in completed days.
        days: i32,
    },
    /// Max-price aggregation.
    MaxPrice {
        /// Product name.
        product: String,
        /// Window size in completed days.
        days: i32,
    },
    /// Events of one day, filtered by product membership.
    FilterEvents {
        /// Products to keep; empty means all products.
        products: Vec<String>,
        /// 0 = current day, k = k-th most recently completed day.
        day_offset: i32,
    },
    /// Block until both products have sold in the current day.
    SimultaneousSales {
        /// First product.
        product1: String,
        /// Second product.
        product2: String,
    },
    /// Block until `n` consecutive events share a product.
    ConsecutiveSales {
        /// Run length to wait for.
        n: i32,
    },
    /// Rotate the current day.
    NewDay,
}

impl Request {
    /// The opcode this request is transmitted under.
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Register { .. } => OpCode::Register,
            Request::Login { .. } => OpCode::Login,
            Request::Logout => OpCode::Logout,
            Request::AddEvent { .. } => OpCode::AddEvent,
            Request::QuantitySold { .. } => OpCode::QuantitySold,
            Request::SalesVolume { .. } => OpCode::SalesVolume,
            Request::AveragePrice { .. } => OpCode::AveragePrice,
            Request::MaxPrice { .. } => OpCode::MaxPrice,
            Request::FilterEvents { .. } => OpCode::FilterEvents,
            Request::SimultaneousSales { .. } => OpCode::SimultaneousSales,
            Request::ConsecutiveSales { .. } => OpCode::ConsecutiveSales,
            Request::NewDay => OpCode::NewDay,
        }
    }

    /// Serializes the request body: `request_id | opcode | payload`.
    pub fn encode(&self, request_id: i32) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_i32(request_id);
        w.put_u8(self.opcode() as u8);

        match self {
            Request::Register { username, password } | Request::Login { username, password } => {
                w.put_string(username);
                w.put_string(password);
            }
            Request::AddEvent {
                product,
                quantity,
                price,
            } => {
                w.put_string(product);
                w.put_i32(*quantity);
                w.put_f64(*price);
            }
            Request::QuantitySold { product, days }
            | Request::SalesVolume { product, days }
            | Request::AveragePrice { product, days }
            | Request::MaxPrice { product, days } => {
                w.put_string(product);
                w.put_i32(*days);
            }
            Request::FilterEvents {
                products,
                day_offset,
            } => {
                w.put_string_list(products);
                w.put_i32(*day_offset);
            }
            Request::SimultaneousSales { product1, product2 } => {
                w.put_string(product1);
                w.put_string(product2);
            }
            Request::ConsecutiveSales { n } => {
                w.put_i32(*n);
            }
            Request::Logout | Request::NewDay => {}
        }

        w.into_bytes()
    }

    /// Deserializes a request body, returning the inner request id and the
    /// typed request.
    pub fn decode(body: &[u8]) -> Result<(i32, Request), ProtocolError> {
        let mut r = ByteReader::new(body);
        let request_id = r.get_i32()?;
        let op = OpCode::try_from(r.get_u8()?)?;

        let request = match op {
            OpCode::Register => Request::Register {
                username: r.get_string()?,
                password: r.get_string()?,
            },
            OpCode::Login => Request::Login {
                username: r.get_string()?,
                password: r.get_string()?,
            },
            OpCode::Logout => Request::Logout,
            OpCode::AddEvent => Request::AddEvent {
                product: r.get_string()?,
                quantity: r.get_i32()?,
                price: r.get_f64()?,
            },
            OpCode::QuantitySold => Request::QuantitySold {
                product: r.get_string()?,
                days: r.get_i32()?,
            },
            OpCode::SalesVolume => Request::SalesVolume {
                product: r.get_string()?,
                days: r.get_i32()?,
            },
            OpCode::AveragePrice => Request::AveragePrice {
                product: r.get_string()?,
                days: r.get_i32()?,
            },
            OpCode::MaxPrice => Request::MaxPrice {
                product: r.get_string()?,
                days: r.get_i32()?,
            },
            OpCode::FilterEvents => Request::FilterEvents {
                products: r.get_string_list()?,
                day_offset: r.get_i32()?,
            },
            OpCode::SimultaneousSales => Request::SimultaneousSales {
                product1: r.get_string()?,
                product2: r.get_string()?,
            },
            OpCode::ConsecutiveSales => Request::ConsecutiveSales { n: r.get_i32()? },
            OpCode::NewDay => Request::NewDay,
        };

        Ok((request_id, request))
    }
}

/// Success payload of a response. The variant must match the opcode the
/// response answers.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    /// No additional data (REGISTER, LOGIN, LOGOUT, ADD_EVENT, NEW_DAY).
    Empty,
    /// QUANTITY_SOLD result.
    Quantity(i32),
    /// SALES_VOLUME result.
    Revenue(f64),
    /// AVERAGE_PRICE result.
    AveragePrice(f64),
    /// MAX_PRICE result.
    MaxPrice(f64),
    /// FILTER_EVENTS result.
    Events(Vec<Event>),
    /// SIMULTANEOUS_SALES result.
    Simultaneous(bool),
    /// CONSECUTIVE_SALES result; `None` means the day ended first and is
    /// transmitted as an empty product string.
    Consecutive(Option<String>),
}

/// A server response: echoed request id, status, and either a payload or an
/// error message.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Echo of the inner request id (opaque; correlation uses the tag).
    pub request_id: i32,
    /// Outcome status.
    pub status: Status,
    /// Present exactly when `status != Ok`.
    pub error_message: Option<String>,
    /// Present exactly when `status == Ok`.
    pub payload: ResponsePayload,
}

impl Response {
    /// A successful response carrying `payload`.
    pub fn success(request_id: i32, payload: ResponsePayload) -> Self {
        Response {
            request_id,
            status: Status::Ok,
            error_message: None,
            payload,
        }
    }

    /// A failed response carrying a message.
    pub fn error(request_id: i32, status: Status, message: &str) -> Self {
        Response {
            request_id,
            status,
            error_message: Some(message.to_string()),
            payload: ResponsePayload::Empty,
        }
    }

    /// Whether the response reports success.
    pub fn is_success(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serializes the response body: `request_id | status | rest`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_i32(self.request_id);
        w.put_u8(self.status as u8);

        if self.status != Status::Ok {
            w.put_string(self.error_message.as_deref().unwrap_or(""));
            return w.into_bytes();
        }

        match &self.payload {
            ResponsePayload::Empty => {}
            ResponsePayload::Quantity(q) => w.put_i32(*q),
            ResponsePayload::Revenue(v)
            | ResponsePayload::AveragePrice(v)
            | ResponsePayload::MaxPrice(v) => w.put_f64(*v),
            ResponsePayload::Events(events) => {
                // Encoding never fails here: the dictionary bound is checked
                // when the list is built server-side.
                write_event_list(&mut w, events);
            }
            ResponsePayload::Simultaneous(b) => w.put_bool(*b),
            ResponsePayload::Consecutive(product) => {
                w.put_string(product.as_deref().unwrap_or(""));
            }
        }

        w.into_bytes()
    }

    /// Deserializes a response body. The payload shape depends on the
    /// operation the caller originally sent.
    pub fn decode(body: &[u8], op: OpCode) -> Result<Response, ProtocolError> {
        let mut r = ByteReader::new(body);
        let request_id = r.get_i32()?;
        let status = Status::try_from(r.get_u8()?)?;

        if status != Status::Ok {
            return Ok(Response {
                request_id,
                status,
                error_message: Some(r.get_string()?),
                payload: ResponsePayload::Empty,
            });
        }

        let payload = match op {
            OpCode::Register
            | OpCode::Login
            | OpCode::Logout
            | OpCode::AddEvent
            | OpCode::NewDay => ResponsePayload::Empty,
            OpCode::QuantitySold => ResponsePayload::Quantity(r.get_i32()?),
            OpCode::SalesVolume => ResponsePayload::Revenue(r.get_f64()?),
            OpCode::AveragePrice => ResponsePayload::AveragePrice(r.get_f64()?),
            OpCode::MaxPrice => ResponsePayload::MaxPrice(r.get_f64()?),
            OpCode::FilterEvents => ResponsePayload::Events(read_event_list(&mut r)?),
            OpCode::SimultaneousSales => ResponsePayload::Simultaneous(r.get_bool()?),
            OpCode::ConsecutiveSales => {
                let product = r.get_string()?;
                ResponsePayload::Consecutive(if product.is_empty() {
                    None
                } else {
                    Some(product)
                })
            }
        };

        Ok(Response {
            request_id,
            status,
            error_message: None,
            payload,
        })
    }
}

// Dictionary-compressed event list. Many events share product names, so the
// distinct names go into an index table written once.
fn write_event_list(w: &mut ByteWriter, events: &[Event]) {
    let mut positions: HashMap<&str, i16> = HashMap::new();
    let mut dict: Vec<&str> = Vec::new();
    let mut indices: Vec<i16> = Vec::with_capacity(events.len());

    for event in events {
        // i16::MAX distinct products bounds the table; the server-side
        // builder enforces it before encoding.
        let idx = *positions.entry(&event.product).or_insert_with(|| {
            dict.push(&event.product);
            (dict.len() - 1) as i16
        });
        indices.push(idx);
    }

    w.put_i32(dict.len() as i32);
    for product in &dict {
        w.put_string(product);
    }

    w.put_i32(events.len() as i32);
    for (event, idx) in events.iter().zip(indices) {
        w.put_i16(idx);
        w.put_i32(event.quantity);
        w.put_f64(event.price);
        w.put_i64(event.timestamp);
    }
}

fn read_event_list(r: &mut ByteReader<'_>) -> Result<Vec<Event>, ProtocolError> {
    let dict_size = r.get_i32()?;
    if dict_size == -1 {
        // Null list on the wire; decoded as empty.
        return Ok(Vec::new());
    }
    if dict_size < 0 {
        return Err(ProtocolError::Truncated("event dictionary"));
    }

    let mut dict = Vec::with_capacity(dict_size as usize);
    for _ in 0..dict_size {
        dict.push(r.get_string()?);
    }

    let count = r.get_i32()?;
    if count < 0 {
        return Err(ProtocolError::Truncated("event count"));
    }

    let mut events = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let idx = r.get_i16()?;
        let product = dict
            .get(idx as usize)
            .ok_or(ProtocolError::BadDictIndex(idx))?
            .clone();
        let quantity = r.get_i32()?;
        let price = r.get_f64()?;
        let timestamp = r.get_i64()?;
        events.push(Event {
            product,
            quantity,
            price,
            timestamp,
        });
    }

    Ok(events)
}

/// Writes one frame: `tag | body_len | body`.
pub fn write_frame(out: &mut impl Write, tag: i32, body: &[u8]) -> Result<(), ProtocolError> {
    if body.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            max: MAX_FRAME_BYTES,
            got: body.len(),
        });
    }
    out.write_all(&tag.to_be_bytes())?;
    out.write_all(&(body.len() as i32).to_be_bytes())?;
    out.write_all(body)?;
    out.flush()?;
    Ok(())
}

/// Reads one frame, returning `None` on a clean EOF at a frame boundary.
pub fn read_frame(input: &mut impl Read) -> Result<Option<(i32, Vec<u8>)>, ProtocolError> {
    let mut header = [0u8; 8];
    let mut read = 0usize;
    while read < header.len() {
        let n = input.read(&mut header[read..])?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "frame header truncated",
            )
            .into());
        }
        read += n;
    }

    let tag = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let len = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if len < 0 {
        return Err(ProtocolError::InvalidFrameLength(i64::from(len)));
    }
    let len = len as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            max: MAX_FRAME_BYTES,
            got: len,
        });
    }

    let mut body = vec![0u8; len];
    input.read_exact(&mut body)?;
    Ok(Some((tag, body)))
}

/// Growable big-endian encoder for protocol bodies and persisted records.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// An empty writer.
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    /// Consumes the writer, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a big-endian i16.
    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian i32.
    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian i64.
    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian IEEE-754 double.
    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a boolean as one byte.
    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Appends `i32 len` followed by the UTF-8 bytes.
    pub fn put_string(&mut self, s: &str) {
        self.put_i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Appends `i32 count` followed by each string.
    pub fn put_string_list(&mut self, list: &[String]) {
        self.put_i32(list.len() as i32);
        for s in list {
            self.put_string(s);
        }
    }

    /// Appends raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked big-endian decoder over a byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// A reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.buf.len() {
            return Err(ProtocolError::Truncated(what));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1, "u8")?[0])
    }

    /// Reads a big-endian i16.
    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.take(2, "i16")?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian i32.
    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian i64.
    pub fn get_i64(&mut self) -> Result<i64, ProtocolError> {
        let b = self.take(8, "i64")?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a big-endian IEEE-754 double.
    pub fn get_f64(&mut self) -> Result<f64, ProtocolError> {
        let b = self.take(8, "f64")?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a one-byte boolean.
    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.get_u8()? != 0)
    }

    /// Reads `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n, "bytes")
    }

    /// Reads `i32 len` followed by that many UTF-8 bytes.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.get_i32()?;
        if len < 0 {
            return Err(ProtocolError::Truncated("string length"));
        }
        let bytes = self.take(len as usize, "string")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads `i32 count` followed by that many strings.
    pub fn get_string_list(&mut self) -> Result<Vec<String>, ProtocolError> {
        let count = self.get_i32()?;
        if count < 0 {
            return Err(ProtocolError::Truncated("string list count"));
        }
        let mut list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            list.push(self.get_string()?);
        }
        Ok(list)
    }
}
