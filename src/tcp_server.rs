//! TCP server: accept loop, per-connection reader threads, and the request
//! dispatcher that runs on the worker pool.
//!
//! Each connection gets a dedicated reader thread that frames requests and
//! submits every one as an independent pool task, so a blocking query on a
//! connection never delays the other requests arriving on it. Responses go
//! out through a per-connection writer mutex and carry the request's frame
//! tag; nothing guarantees they leave in arrival order.

use crate::aggregation::AggregationService;
use crate::auth::{AuthStore, RegisterOutcome, User};
use crate::errors::{PersistenceError, ProtocolError, ServerError, TimeSeriesError};
use crate::persistence::Persistence;
use crate::protocol::{self, Request, Response, ResponsePayload, Status};
use crate::time_series::TimeSeries;
use crate::worker_pool::WorkerPool;

use std::collections::HashSet;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// Message sent when a windowed aggregation has fewer completed days than
/// requested.
pub const MSG_INSUFFICIENT_DATA: &str = "Dados insuficientes";

/// Everything a request handler needs, shared by all connections.
pub struct ServerState {
    /// User accounts.
    pub auth: Arc<AuthStore>,
    /// The time-series store.
    pub series: Arc<TimeSeries>,
    /// Cached aggregations over `series`.
    pub aggregation: Arc<AggregationService>,
    /// Pool executing request tasks.
    pub pool: Arc<WorkerPool>,
    /// Persistence root, for explicit save triggers.
    pub persistence: Persistence,
}

impl ServerState {
    /// Rotates the day and flushes the aggregation cache. Used by both the
    /// NEW_DAY wire operation and the admin console.
    pub fn rotate_day(&self) -> Result<i32, TimeSeriesError> {
        let new_id = self.series.new_day()?;
        self.aggregation.invalidate_on_new_day();
        Ok(new_id)
    }

    /// Saves users and the state header. Day files are written during
    /// rotation; the live day's events stay in memory only.
    pub fn save_all(&self) -> Result<(), PersistenceError> {
        self.persistence.save_users(&self.auth.all_users())?;
        self.persistence.save_state(self.series.current_day_id())?;
        log::info!(
            "Saved {} users, current day {}",
            self.auth.user_count(),
            self.series.current_day_id()
        );
        Ok(())
    }
}

/// TCP front end: owns the listener and a shared [`ServerState`].
pub struct SalesServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl SalesServer {
    /// Binds to `addr`.
    pub fn bind(addr: &str, state: Arc<ServerState>) -> Result<Self, ServerError> {
        log::info!("Binding TCP server to address: {}", addr);
        let listener = TcpListener::bind(addr).map_err(|e| ServerError::Bind(e.to_string()))?;
        log::info!("TCP server successfully bound to: {}", addr);
        Ok(SalesServer { listener, state })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))
    }

    /// Accept loop. Spawns one reader thread per connection; blocks the
    /// calling thread until accept fails.
    pub fn start(&self) -> Result<(), ServerError> {
        log::info!("TCP server starting main loop");
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("New TCP connection from: {}", addr);
                    let state = Arc::clone(&self.state);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, addr, state) {
                            log::warn!("Connection handler error for {}: {}", addr, e);
                        }
                        log::debug!("Handler thread finished for client: {}", addr);
                    });
                }
                Err(e) => {
                    log::error!("Failed to accept TCP connection: {}", e);
                    return Err(ServerError::Accept(e.to_string()));
                }
            }
        }
    }
}

/// Reader loop for one connection. Frames requests and hands each to the
/// worker pool together with the shared writer and session state.
fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let writer = Arc::new(Mutex::new(
        stream
            .try_clone()
            .map_err(|e| ServerError::ClientIo(e.to_string()))?,
    ));
    // LOGIN on one in-flight task must be visible to the next, so the
    // authenticated user lives behind a connection-scoped mutex.
    let session: Arc<Mutex<Option<User>>> = Arc::new(Mutex::new(None));
    let mut reader = BufReader::new(stream);

    loop {
        match protocol::read_frame(&mut reader) {
            Ok(Some((tag, body))) => match Request::decode(&body) {
                Ok((request_id, request)) => {
                    let task_state = Arc::clone(&state);
                    let task_writer = Arc::clone(&writer);
                    let task_session = Arc::clone(&session);
                    let submitted = state.pool.execute(move || {
                        let op = request.opcode();
                        log::debug!("[{}] tag {} -> {}", addr, tag, op.name());
                        let response =
                            process_request(&task_state, &task_session, request_id, request);
                        log::debug!(
                            "[{}] tag {} <- {}",
                            addr,
                            tag,
                            response.status.name()
                        );
                        send_response(&task_writer, tag, &response, addr);
                    });
                    if let Err(e) = submitted {
                        log::warn!("[{}] dropping request, pool unavailable: {}", addr, e);
                        return Ok(());
                    }
                }
                Err(ProtocolError::UnknownOpcode(op)) => {
                    log::warn!("[{}] unknown opcode {:#04x}", addr, op);
                    let response = Response::error(0, Status::InvalidParams, "Unknown operation");
                    send_response(&writer, tag, &response, addr);
                }
                Err(e) => {
                    log::warn!("[{}] undecodable request, closing: {}", addr, e);
                    return Ok(());
                }
            },
            Ok(None) => {
                log::info!("Client {} closed connection", addr);
                return Ok(());
            }
            Err(e) => {
                log::warn!("[{}] read error: {}", addr, e);
                return Ok(());
            }
        }
    }
}

fn send_response(writer: &Mutex<TcpStream>, tag: i32, response: &Response, addr: SocketAddr) {
    let bytes = response.encode();
    let mut guard = match writer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Err(e) = protocol::write_frame(&mut *guard, tag, &bytes) {
        log::warn!("[{}] failed to send response: {}", addr, e);
    }
}

/// Dispatches one request. REGISTER and LOGIN are open; everything else
/// requires the connection to be authenticated.
fn process_request(
    state: &ServerState,
    session: &Mutex<Option<User>>,
    request_id: i32,
    request: Request,
) -> Response {
    match request {
        Request::Register { username, password } => {
            match state.auth.register(&username, &password) {
                RegisterOutcome::Created => Response::success(request_id, ResponsePayload::Empty),
                RegisterOutcome::AlreadyExists => Response::error(
                    request_id,
                    Status::UserExists,
                    "Username already exists",
                ),
                RegisterOutcome::Invalid => Response::error(
                    request_id,
                    Status::InvalidParams,
                    "Username and password must be non-empty",
                ),
            }
        }

        Request::Login { username, password } => {
            match state.auth.authenticate(&username, &password) {
                Some(user) => {
                    *lock_session(session) = Some(user);
                    Response::success(request_id, ResponsePayload::Empty)
                }
                None => Response::error(request_id, Status::AuthFailed, "Invalid credentials"),
            }
        }

        Request::Logout => {
            let mut guard = lock_session(session);
            if guard.is_none() {
                return not_authenticated(request_id);
            }
            *guard = None;
            Response::success(request_id, ResponsePayload::Empty)
        }

        Request::AddEvent {
            product,
            quantity,
            price,
        } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            if product.trim().is_empty() || quantity < 0 || price < 0.0 || !price.is_finite() {
                return invalid_params(request_id);
            }
            match state.series.add_event(&product, quantity, price) {
                Ok(()) => {
                    state.aggregation.invalidate_on_new_event(&product);
                    Response::success(request_id, ResponsePayload::Empty)
                }
                Err(e) => {
                    log::error!("Failed to add event: {}", e);
                    Response::error(request_id, Status::Error, "Failed to add event")
                }
            }
        }

        Request::QuantitySold { product, days } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            match state.aggregation.aggregate_quantity(&product, days) {
                Some(total) => {
                    Response::success(request_id, ResponsePayload::Quantity(total as i32))
                }
                None => Response::error(request_id, Status::Error, MSG_INSUFFICIENT_DATA),
            }
        }

        Request::SalesVolume { product, days } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            match state.aggregation.aggregate_revenue(&product, days) {
                Some(total) => Response::success(request_id, ResponsePayload::Revenue(total)),
                None => Response::error(request_id, Status::Error, MSG_INSUFFICIENT_DATA),
            }
        }

        Request::AveragePrice { product, days } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            match state.aggregation.aggregate_average_price(&product, days) {
                Some(avg) => Response::success(request_id, ResponsePayload::AveragePrice(avg)),
                None => Response::error(request_id, Status::Error, MSG_INSUFFICIENT_DATA),
            }
        }

        Request::MaxPrice { product, days } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            match state.aggregation.aggregate_max_price(&product, days) {
                Some(max) => Response::success(request_id, ResponsePayload::MaxPrice(max)),
                None => Response::error(request_id, Status::Error, MSG_INSUFFICIENT_DATA),
            }
        }

        Request::FilterEvents {
            products,
            day_offset,
        } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            if day_offset < 0 {
                return invalid_params(request_id);
            }
            let events = state.series.filtered_events(&products, day_offset);

            // The wire dictionary indexes products with an i16.
            let distinct: HashSet<&str> = events.iter().map(|e| e.product.as_str()).collect();
            if distinct.len() > i16::MAX as usize {
                return Response::error(
                    request_id,
                    Status::Error,
                    "Too many distinct products for one response",
                );
            }
            Response::success(request_id, ResponsePayload::Events(events))
        }

        Request::SimultaneousSales { product1, product2 } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            if product1.trim().is_empty() || product2.trim().is_empty() {
                return invalid_params(request_id);
            }
            match state.series.wait_for_simultaneous_sales(&product1, &product2) {
                Ok(result) => {
                    Response::success(request_id, ResponsePayload::Simultaneous(result))
                }
                Err(e) => {
                    log::error!("Simultaneous-sales waiter failed: {}", e);
                    Response::error(request_id, Status::Error, "Wait failed")
                }
            }
        }

        Request::ConsecutiveSales { n } => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            if n < 1 {
                return invalid_params(request_id);
            }
            match state.series.wait_for_consecutive_sales(n as usize) {
                Ok(product) => {
                    Response::success(request_id, ResponsePayload::Consecutive(product))
                }
                Err(e) => {
                    log::error!("Consecutive-sales waiter failed: {}", e);
                    Response::error(request_id, Status::Error, "Wait failed")
                }
            }
        }

        Request::NewDay => {
            if authenticated(session).is_none() {
                return not_authenticated(request_id);
            }
            match state.rotate_day() {
                Ok(new_id) => {
                    log::info!("Day rotated by client request; current day is {}", new_id);
                    Response::success(request_id, ResponsePayload::Empty)
                }
                Err(e) => {
                    log::error!("Day rotation failed: {}", e);
                    Response::error(request_id, Status::Error, "Day rotation failed")
                }
            }
        }
    }
}

fn lock_session(session: &Mutex<Option<User>>) -> std::sync::MutexGuard<'_, Option<User>> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Snapshot of the authenticated user at task entry. A LOGOUT racing with an
// in-flight operation may land before or after this read; both orders are
// accepted.
fn authenticated(session: &Mutex<Option<User>>) -> Option<User> {
    lock_session(session).clone()
}

fn not_authenticated(request_id: i32) -> Response {
    Response::error(request_id, Status::NotAuthenticated, "Not authenticated")
}

fn invalid_params(request_id: i32) -> Response {
    Response::error(request_id, Status::InvalidParams, "Invalid parameters")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SalesClient;
    use crate::errors::ClientError;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Boots a full server on an ephemeral port and returns its address.
    fn start_test_server(max_days: usize, memory_days: usize) -> (TempDir, SocketAddr) {
        let dir = TempDir::new().unwrap();
        let persistence = Persistence::new(dir.path());
        let series = Arc::new(
            TimeSeries::new(max_days, memory_days, persistence.clone()).unwrap(),
        );
        let state = Arc::new(ServerState {
            auth: Arc::new(AuthStore::new()),
            series: Arc::clone(&series),
            aggregation: Arc::new(AggregationService::new(series, memory_days)),
            pool: Arc::new(WorkerPool::new(4)),
            persistence,
        });

        let server = SalesServer::bind("127.0.0.1:0", state).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let _ = server.start();
        });
        (dir, addr)
    }

    fn assert_status(result: Result<(), ClientError>, expected: &str) {
        match result {
            Err(ClientError::Server { status, .. }) => assert_eq!(status, expected),
            other => panic!("expected {} error, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_register_login_logout_flow() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();

        client.register("alice", "secret").unwrap();
        assert_status(client.login("alice", "wrong"), "AUTH_FAILED");
        client.login("alice", "secret").unwrap();
        assert!(client.is_authenticated());

        client.add_event("apple", 1, 1.0).unwrap();
        client.logout().unwrap();
        assert!(!client.is_authenticated());
        // Client-side gate fires before any bytes go out.
        assert!(matches!(
            client.add_event("apple", 1, 1.0),
            Err(ClientError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_unauthenticated_rejected_server_side() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();

        // Bypass the client-side gate: send a raw ADD_EVENT on a fresh,
        // never-logged-in connection.
        let request = Request::AddEvent {
            product: "apple".into(),
            quantity: 1,
            price: 1.0,
        };
        let demux = crate::demultiplexer::Demultiplexer::new(
            std::net::TcpStream::connect(addr).unwrap(),
        )
        .unwrap();
        let reply = demux.send(&request.encode(0)).unwrap();
        let response = Response::decode(&reply, request.opcode()).unwrap();
        assert_eq!(response.status, Status::NotAuthenticated);
        drop(client);
    }

    #[test]
    fn test_duplicate_registration() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();
        match client.register("alice", "other") {
            Err(ClientError::Server { status, .. }) => assert_eq!(status, "USER_EXISTS"),
            other => panic!("expected USER_EXISTS, got {:?}", other),
        }
    }

    #[test]
    fn test_window_aggregations_over_wire() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        client.add_event("apple", 2, 1.0).unwrap();
        client.add_event("apple", 3, 2.0).unwrap();
        client.new_day().unwrap();
        client.add_event("apple", 1, 5.0).unwrap();
        client.new_day().unwrap();

        assert_eq!(client.quantity_sold("apple", 2).unwrap(), 6);
        assert!((client.sales_volume("apple", 2).unwrap() - 13.0).abs() < 1e-9);
        assert!((client.average_price("apple", 2).unwrap() - 13.0 / 6.0).abs() < 1e-9);
        assert!((client.max_price("apple", 2).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_data_over_wire() {
        let (_dir, addr) = start_test_server(5, 5);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        client.add_event("apple", 1, 1.0).unwrap();
        client.new_day().unwrap();

        match client.quantity_sold("apple", 5) {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, "ERROR");
                assert_eq!(message, MSG_INSUFFICIENT_DATA);
            }
            other => panic!("expected insufficient-data error, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_events_over_wire() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        client.add_event("apple", 1, 1.0).unwrap();
        client.add_event("pear", 2, 2.0).unwrap();
        client.add_event("apple", 3, 3.0).unwrap();

        let apples = client.filter_events(&["apple".to_string()], 0).unwrap();
        assert_eq!(apples.len(), 2);
        assert_eq!(apples[0].quantity, 1);
        assert_eq!(apples[1].quantity, 3);

        let everything = client.filter_events(&[], 0).unwrap();
        assert_eq!(everything.len(), 3);

        assert!(matches!(
            client.filter_events(&[], -1),
            Err(ClientError::Server { .. })
        ));
    }

    #[test]
    fn test_simultaneous_sales_blocking_over_wire() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = Arc::new(SalesClient::connect(addr).unwrap());
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        let blocked = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.simultaneous_sales("a", "b").unwrap())
        };

        // While the first request blocks server-side, the same connection
        // keeps serving other requests.
        thread::sleep(Duration::from_millis(100));
        client.add_event("a", 1, 1.0).unwrap();
        // No completed days yet, so the aggregation answers (with an
        // error) instead of queueing behind the blocked request.
        assert!(client.quantity_sold("a", 1).is_err());
        client.add_event("b", 1, 1.0).unwrap();

        assert!(blocked.join().unwrap());
    }

    #[test]
    fn test_simultaneous_sales_false_after_new_day() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = Arc::new(SalesClient::connect(addr).unwrap());
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        let blocked = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.simultaneous_sales("a", "b").unwrap())
        };

        thread::sleep(Duration::from_millis(100));
        client.add_event("a", 1, 1.0).unwrap();
        client.new_day().unwrap();

        assert!(!blocked.join().unwrap());
    }

    #[test]
    fn test_consecutive_sales_over_wire() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = Arc::new(SalesClient::connect(addr).unwrap());
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        let blocked = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.consecutive_sales(3).unwrap())
        };

        thread::sleep(Duration::from_millis(100));
        for product in ["a", "a", "b", "a", "a", "a"] {
            client.add_event(product, 1, 1.0).unwrap();
        }

        assert_eq!(blocked.join().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_consecutive_sales_none_after_new_day() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = Arc::new(SalesClient::connect(addr).unwrap());
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        let blocked = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.consecutive_sales(3).unwrap())
        };

        thread::sleep(Duration::from_millis(100));
        client.add_event("a", 1, 1.0).unwrap();
        client.new_day().unwrap();

        assert_eq!(blocked.join().unwrap(), None);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (_dir, addr) = start_test_server(3, 3);
        let client = SalesClient::connect(addr).unwrap();
        client.register("alice", "secret").unwrap();
        client.login("alice", "secret").unwrap();

        for result in [
            client.add_event("", 1, 1.0),
            client.add_event("apple", -1, 1.0),
            client.add_event("apple", 1, -2.0),
        ] {
            match result {
                Err(ClientError::Server { status, .. }) => {
                    assert_eq!(status, "INVALID_PARAMS")
                }
                other => panic!("expected INVALID_PARAMS, got {:?}", other),
            }
        }
        assert!(matches!(
            client.consecutive_sales(0),
            Err(ClientError::Server { .. })
        ));
    }

    #[test]
    fn test_persistence_roundtrip_across_restart() {
        let dir = TempDir::new().unwrap();

        let boot = |load: bool| -> (Arc<ServerState>, SocketAddr) {
            let persistence = Persistence::new(dir.path());
            let series = if load {
                TimeSeries::load(3, 3, persistence.clone()).unwrap()
            } else {
                TimeSeries::new(3, 3, persistence.clone()).unwrap()
            };
            let series = Arc::new(series);
            let auth = Arc::new(AuthStore::new());
            if load {
                for user in persistence.load_users().unwrap() {
                    auth.register_prehashed(user);
                }
            }
            let state = Arc::new(ServerState {
                auth,
                series: Arc::clone(&series),
                aggregation: Arc::new(AggregationService::new(series, 3)),
                pool: Arc::new(WorkerPool::new(2)),
                persistence,
            });
            let server = SalesServer::bind("127.0.0.1:0", Arc::clone(&state)).unwrap();
            let addr = server.local_addr().unwrap();
            thread::spawn(move || {
                let _ = server.start();
            });
            (state, addr)
        };

        {
            let (state, addr) = boot(false);
            let client = SalesClient::connect(addr).unwrap();
            client.register("alice", "secret").unwrap();
            client.login("alice", "secret").unwrap();
            client.add_event("apple", 2, 1.0).unwrap();
            client.add_event("apple", 3, 2.0).unwrap();
            client.new_day().unwrap();
            state.save_all().unwrap();
        }

        let (_state, addr) = boot(true);
        let client = SalesClient::connect(addr).unwrap();
        client.login("alice", "secret").unwrap();
        assert_eq!(client.quantity_sold("apple", 1).unwrap(), 5);
        assert!((client.sales_volume("apple", 1).unwrap() - 8.0).abs() < 1e-9);
    }
}
