//! High-level client for the sales server.
//!
//! Wraps a [`Demultiplexer`] with one method per protocol operation. The
//! client is safe to share across threads; blocking queries
//! ([`SalesClient::simultaneous_sales`], [`SalesClient::consecutive_sales`])
//! occupy only their calling thread while other requests keep flowing over
//! the same connection.

use crate::demultiplexer::Demultiplexer;
use crate::errors::ClientError;
use crate::protocol::{Event, OpCode, Request, Response, ResponsePayload};

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;

/// Connection-backed client with one method per server operation.
pub struct SalesClient {
    demux: Demultiplexer,
    session: Mutex<Option<String>>,
}

impl SalesClient {
    /// Connects to a sales server.
    pub fn connect<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> Result<Self, ClientError> {
        log::info!("Connecting to sales server at {:?}", addr);
        let stream = TcpStream::connect(addr).map_err(crate::errors::DemuxError::Io)?;
        Ok(SalesClient {
            demux: Demultiplexer::new(stream)?,
            session: Mutex::new(None),
        })
    }

    /// The username this client logged in as, if any.
    pub fn current_user(&self) -> Option<String> {
        self.lock_session().clone()
    }

    /// Whether a login has succeeded on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.lock_session().is_some()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // The inner request id is always written as zero; the demultiplexer's
    // frame tag is the real correlation key.
    fn call(&self, request: Request) -> Result<Response, ClientError> {
        let op = request.opcode();
        let reply = self.demux.send(&request.encode(0))?;
        Ok(Response::decode(&reply, op)?)
    }

    fn expect_ok(response: Response) -> Result<ResponsePayload, ClientError> {
        if response.is_success() {
            Ok(response.payload)
        } else {
            Err(ClientError::Server {
                status: response.status.name(),
                message: response.error_message.unwrap_or_default(),
            })
        }
    }

    fn ensure_authenticated(&self) -> Result<(), ClientError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    /// Registers a new account.
    pub fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self.call(Request::Register {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        Self::expect_ok(response).map(|_| ())
    }

    /// Authenticates this connection.
    pub fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self.call(Request::Login {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        Self::expect_ok(response)?;
        *self.lock_session() = Some(username.to_string());
        Ok(())
    }

    /// Drops this connection's authentication.
    pub fn logout(&self) -> Result<(), ClientError> {
        let response = self.call(Request::Logout)?;
        Self::expect_ok(response)?;
        *self.lock_session() = None;
        Ok(())
    }

    /// Records a sale of `quantity` units of `product` at `price`.
    pub fn add_event(&self, product: &str, quantity: i32, price: f64) -> Result<(), ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::AddEvent {
            product: product.to_string(),
            quantity,
            price,
        })?;
        Self::expect_ok(response).map(|_| ())
    }

    /// Total quantity of `product` sold over the last `days` completed days.
    pub fn quantity_sold(&self, product: &str, days: i32) -> Result<i32, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::QuantitySold {
            product: product.to_string(),
            days,
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::Quantity(q) => Ok(q),
            other => Err(unexpected_payload(OpCode::QuantitySold, &other)),
        }
    }

    /// Total revenue of `product` over the last `days` completed days.
    pub fn sales_volume(&self, product: &str, days: i32) -> Result<f64, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::SalesVolume {
            product: product.to_string(),
            days,
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::Revenue(v) => Ok(v),
            other => Err(unexpected_payload(OpCode::SalesVolume, &other)),
        }
    }

    /// Quantity-weighted average price of `product` over the window.
    pub fn average_price(&self, product: &str, days: i32) -> Result<f64, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::AveragePrice {
            product: product.to_string(),
            days,
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::AveragePrice(v) => Ok(v),
            other => Err(unexpected_payload(OpCode::AveragePrice, &other)),
        }
    }

    /// Maximum unit price of `product` over the window.
    pub fn max_price(&self, product: &str, days: i32) -> Result<f64, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::MaxPrice {
            product: product.to_string(),
            days,
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::MaxPrice(v) => Ok(v),
            other => Err(unexpected_payload(OpCode::MaxPrice, &other)),
        }
    }

    /// Events of one day filtered by product membership. An empty product
    /// list selects everything; `day_offset` 0 is the current day.
    pub fn filter_events(
        &self,
        products: &[String],
        day_offset: i32,
    ) -> Result<Vec<Event>, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::FilterEvents {
            products: products.to_vec(),
            day_offset,
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::Events(events) => Ok(events),
            other => Err(unexpected_payload(OpCode::FilterEvents, &other)),
        }
    }

    /// Blocks until both products have sold in the current day; false when
    /// the day ends first.
    pub fn simultaneous_sales(&self, product1: &str, product2: &str) -> Result<bool, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::SimultaneousSales {
            product1: product1.to_string(),
            product2: product2.to_string(),
        })?;
        match Self::expect_ok(response)? {
            ResponsePayload::Simultaneous(result) => Ok(result),
            other => Err(unexpected_payload(OpCode::SimultaneousSales, &other)),
        }
    }

    /// Blocks until `n` consecutive events share a product, returning it;
    /// `None` when the day ends first.
    pub fn consecutive_sales(&self, n: i32) -> Result<Option<String>, ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::ConsecutiveSales { n })?;
        match Self::expect_ok(response)? {
            ResponsePayload::Consecutive(product) => Ok(product),
            other => Err(unexpected_payload(OpCode::ConsecutiveSales, &other)),
        }
    }

    /// Asks the server to rotate the current day.
    pub fn new_day(&self) -> Result<(), ClientError> {
        self.ensure_authenticated()?;
        let response = self.call(Request::NewDay)?;
        Self::expect_ok(response).map(|_| ())
    }

    /// Closes the connection, unblocking any in-flight calls.
    pub fn close(&self) {
        self.demux.close();
        *self.lock_session() = None;
    }
}

fn unexpected_payload(op: OpCode, payload: &ResponsePayload) -> ClientError {
    log::error!("{} answered with mismatched payload {:?}", op.name(), payload);
    ClientError::Server {
        status: "ERROR",
        message: format!("unexpected payload for {}", op.name()),
    }
}
