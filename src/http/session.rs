//! HTTP exchange over a packet stream
//!
//! `HttpSession` is a [`StreamObserver`]: it sends the request once the
//! stream connects, feeds every arriving packet to the response parser, and
//! settles the outcome when the stream closes. The outcome is settled
//! exactly once per request; whatever happens afterwards is ignored.

use super::parser::ResponseParser;
use super::request::{HttpRequest, Method};
use super::{Error, Result};
use crate::net::packet::{Packet, StringPacket};
use crate::net::stream::{StreamControl, StreamObserver};
use crate::observer::{Subscribers, SubscriptionId};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tracing::{debug, warn};

/// HTTP exchange events
///
/// All methods default to doing nothing.
pub trait HttpObserver {
    /// The request was accepted and the connection is being opened
    fn started(&mut self, _request: &HttpRequest) {}

    /// Body bytes arrived; `percent` is 0 without a `Content-Length`
    fn progress(&mut self, _received: usize, _percent: usize) {}

    /// The response was received in full
    fn completed(&mut self, _status_code: u16, _body: &[u8]) {}

    /// The exchange failed; the body has been discarded
    fn failure(&mut self, _error: &Error) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Completed,
    Failed,
}

/// One request/response exchange at a time
pub struct HttpSession {
    request: Option<HttpRequest>,
    parser: ResponseParser,
    transport_error: Option<String>,
    outcome: Outcome,
    observers: Subscribers<dyn HttpObserver>,
}

impl HttpSession {
    /// Create an idle session
    pub fn new() -> Self {
        HttpSession {
            request: None,
            parser: ResponseParser::new(),
            transport_error: None,
            outcome: Outcome::Pending,
            observers: Subscribers::new(),
        }
    }

    /// Subscribe to exchange events. Only a weak handle is kept.
    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> SubscriptionId
    where
        O: HttpObserver + 'static,
    {
        let observer: Rc<RefCell<dyn HttpObserver>> = observer.clone();
        self.observers.subscribe(&observer)
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Start a new exchange, discarding all response state
    pub fn begin(&mut self, request: HttpRequest) {
        self.parser.reset();
        self.parser.set_body_expected(request.method() != Method::Head);
        self.transport_error = None;
        self.outcome = Outcome::Pending;

        debug!(
            method = %request.method(),
            host = request.host(),
            resource = request.resource(),
            "request started"
        );
        self.observers.notify(|observer| {
            observer.started(&request);
            true
        });
        self.request = Some(request);
    }

    /// Settle the exchange as failed
    ///
    /// Does nothing if the outcome is already settled.
    pub fn fail(&mut self, error: Error) {
        if self.is_finished() {
            return;
        }
        self.outcome = Outcome::Failed;
        self.parser.clear_body();

        warn!(error = %error, "request failed");
        self.observers.notify(|observer| {
            observer.failure(&error);
            true
        });
    }

    fn complete(&mut self) {
        self.outcome = Outcome::Completed;
        let status_code = self.parser.status_code();
        let body = self.parser.body();
        debug!(status = status_code, body = body.len(), "request completed");

        self.observers.notify(|observer| {
            observer.completed(status_code, body);
            true
        });
    }

    fn finalize(&mut self) {
        if self.is_finished() {
            return;
        }
        if let Some(error) = self.transport_error.take() {
            self.fail(Error::Transport(error));
            return;
        }
        match self.parser.finish() {
            Ok(()) => self.complete(),
            Err(e) => self.fail(e),
        }
    }

    fn send_request(&mut self, stream: &mut StreamControl) -> Result<()> {
        let Some(ref request) = self.request else {
            return Ok(());
        };
        let mut packet = StringPacket::verbatim();
        packet
            .set_contents(&request.to_wire())
            .map_err(|e| Error::Net(e.into()))?;
        stream.send_packet(&packet).map_err(|e| Error::Net(e.into()))
    }

    /// The request of the current exchange
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    /// The response parser
    pub fn response(&self) -> &ResponseParser {
        &self.parser
    }

    /// Check if the exchange is settled
    pub fn is_finished(&self) -> bool {
        self.outcome != Outcome::Pending
    }

    /// True only for a 2xx response received without transport error
    /// whose body decoded to its declared length
    pub fn ok(&self) -> bool {
        self.outcome == Outcome::Completed && self.parser.is_success()
    }
}

impl Default for HttpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamObserver for HttpSession {
    fn connection_established(&mut self, stream: &mut StreamControl) {
        if self.is_finished() {
            return;
        }
        if let Err(e) = self.send_request(stream) {
            self.fail(e);
            stream.close();
        }
    }

    fn connection_failure(&mut self, _stream: &mut StreamControl, error: &io::Error) {
        self.fail(Error::Transport(error.to_string()));
    }

    fn packet_arrived(&mut self, stream: &mut StreamControl, packet: &dyn Packet) {
        if self.is_finished() {
            return;
        }
        if let Err(e) = self.parser.feed(packet.contents()) {
            // No point reading the rest of a response we cannot parse
            self.fail(e);
            stream.close();
            return;
        }

        if self.parser.headers_complete() {
            let received = self.parser.body().len();
            let percent = self.parser.percent_done();
            self.observers.notify(|observer| {
                observer.progress(received, percent);
                true
            });
        }
    }

    fn transfer_failure(&mut self, _stream: &mut StreamControl, error: &io::Error) {
        if self.transport_error.is_none() {
            self.transport_error = Some(error.to_string());
        }
    }

    fn connection_closed(&mut self, _stream: &mut StreamControl) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::BinaryPacket;

    #[derive(Default)]
    struct Events {
        seen: Vec<String>,
    }

    impl HttpObserver for Events {
        fn started(&mut self, request: &HttpRequest) {
            self.seen.push(format!("started {}", request.resource()));
        }

        fn completed(&mut self, status_code: u16, body: &[u8]) {
            self.seen.push(format!("completed {} {}", status_code, body.len()));
        }

        fn failure(&mut self, _error: &Error) {
            self.seen.push("failure".to_string());
        }
    }

    fn session_with_events() -> (HttpSession, Rc<RefCell<Events>>) {
        let mut session = HttpSession::new();
        let events = Rc::new(RefCell::new(Events::default()));
        session.subscribe(&events);
        session.begin(HttpRequest::builder().host("example.com").resource("/x").build());
        (session, events)
    }

    fn arrive(session: &mut HttpSession, control: &mut StreamControl, bytes: &[u8]) {
        session.packet_arrived(control, &BinaryPacket::from_slice(bytes));
    }

    #[test]
    fn test_sends_request_on_connect() {
        let (mut session, _) = session_with_events();
        let mut control = StreamControl::default();

        session.connection_established(&mut control);
        assert_eq!(
            control.queued_contents(),
            vec![b"GET /x HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n".to_vec()]
        );
        assert!(!session.is_finished());
    }

    #[test]
    fn test_completes_on_close() {
        let (mut session, events) = session_with_events();
        let mut control = StreamControl::default();

        arrive(&mut session, &mut control, b"HTTP/1.1 200 OK\r\n");
        arrive(&mut session, &mut control, b"Content-Length: 2\r\n");
        arrive(&mut session, &mut control, b"\r\n");
        arrive(&mut session, &mut control, b"hi");
        session.connection_closed(&mut control);

        assert!(session.ok());
        assert_eq!(session.response().body(), b"hi");
        assert_eq!(events.borrow().seen, vec!["started /x", "completed 200 2"]);
    }

    #[test]
    fn test_transport_error_fails_once() {
        let (mut session, events) = session_with_events();
        let mut control = StreamControl::default();

        arrive(&mut session, &mut control, b"HTTP/1.1 200 OK\r\n\r\npartial");
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        session.transfer_failure(&mut control, &err);
        session.connection_closed(&mut control);
        session.connection_closed(&mut control);

        assert!(!session.ok());
        assert!(session.response().body().is_empty());
        assert_eq!(events.borrow().seen, vec!["started /x", "failure"]);
    }

    #[test]
    fn test_protocol_error_requests_close() {
        let (mut session, events) = session_with_events();
        let mut control = StreamControl::default();

        arrive(&mut session, &mut control, b"SMTP ready\r\n");
        assert!(session.is_finished());
        assert!(!session.ok());

        // Whatever follows is ignored
        arrive(&mut session, &mut control, b"HTTP/1.1 200 OK\r\n\r\n");
        session.connection_closed(&mut control);
        assert_eq!(events.borrow().seen, vec!["started /x", "failure"]);
    }

    #[test]
    fn test_non_2xx_completes_but_not_ok() {
        let (mut session, events) = session_with_events();
        let mut control = StreamControl::default();

        arrive(&mut session, &mut control, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        session.connection_closed(&mut control);

        assert!(session.is_finished());
        assert!(!session.ok());
        assert_eq!(session.response().status_code(), 404);
        assert_eq!(events.borrow().seen, vec!["started /x", "completed 404 0"]);
    }

    #[test]
    fn test_begin_resets_state() {
        let (mut session, _) = session_with_events();
        let mut control = StreamControl::default();
        arrive(&mut session, &mut control, b"HTTP/1.1 200 OK\r\n\r\nold");
        session.connection_closed(&mut control);
        assert!(session.ok());

        session.begin(HttpRequest::builder().host("example.com").build());
        assert!(!session.is_finished());
        assert!(!session.ok());
        assert_eq!(session.response().status_code(), 0);
        assert!(session.response().body().is_empty());
    }
}
