//! HTTP client implementation
//!
//! `HttpClient` owns a packet stream of verbatim string packets and an
//! [`HttpSession`] subscribed to it. A request opens the stream; the
//! exchange then progresses as the caller pumps events with
//! [`HttpClient::fetch`] (or [`HttpClient::next_event`]).

use super::request::{HttpRequest, Method};
use super::session::{HttpObserver, HttpSession};
use super::url::Target;
use super::{Error, Headers, Result};
use crate::net::packet::StringPacket;
use crate::net::{ConnectionConfig, Family, PacketStream};
use crate::observer::SubscriptionId;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tracing::debug;

/// HTTP client
pub struct HttpClient {
    stream: PacketStream,
    session: Rc<RefCell<HttpSession>>,
    family: Family,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: ConnectionConfig) -> Self {
        let mut stream = PacketStream::new(config, Box::new(StringPacket::verbatim()));
        let session = Rc::new(RefCell::new(HttpSession::new()));
        stream.subscribe(&session);

        HttpClient {
            stream,
            session,
            family: Family::default(),
        }
    }

    /// Select the address family used for new requests
    pub fn set_family(&mut self, family: Family) {
        self.family = family;
    }

    /// Subscribe to started / progress / completed / failure events
    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> SubscriptionId
    where
        O: HttpObserver + 'static,
    {
        self.session.borrow_mut().subscribe(observer)
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.session.borrow_mut().unsubscribe(id)
    }

    /// Start a request to an `http://` or `https://` URL
    pub fn request(
        &mut self,
        url: &str,
        method: Method,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<()> {
        let target = Target::parse(url)?;
        let mut builder = HttpRequest::for_target(target).method(method).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send(builder.build())
    }

    /// Start a request to an explicit host and resource
    #[allow(clippy::too_many_arguments)]
    pub fn request_to(
        &mut self,
        host: &str,
        resource: &str,
        method: Method,
        port: u16,
        secure: bool,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<()> {
        let mut builder = HttpRequest::builder()
            .method(method)
            .host(host)
            .port(port)
            .secure(secure)
            .resource(resource)
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send(builder.build())
    }

    /// Start a prepared request
    ///
    /// Any exchange still in progress is abandoned. If the connection cannot
    /// even be started, subscribers hear a failure and the error is returned.
    pub fn send(&mut self, request: HttpRequest) -> Result<()> {
        if self.stream.is_open() {
            self.stream.close();
        }
        // The abandoned request must not be written on the new connection
        let released = self.stream.clear_queue();
        if released > 0 {
            debug!(released, "dropped packets of the abandoned exchange");
        }

        let host = request.host().to_string();
        let port = request.port();
        let secure = request.is_secure();
        self.session.borrow_mut().begin(request);

        if let Err(e) = self.stream.open(&host, port, secure, self.family) {
            self.session.borrow_mut().fail(Error::Transport(e.to_string()));
            return Err(Error::Net(e));
        }
        Ok(())
    }

    /// Pump one stream event; `false` once the exchange is over
    pub async fn next_event(&mut self) -> bool {
        self.stream.next_event().await
    }

    /// Run the exchange to completion and report [`ok`](Self::ok)
    pub async fn fetch(&mut self) -> bool {
        self.stream.run().await;
        self.ok()
    }

    /// Abandon the exchange
    pub fn close(&mut self) {
        self.stream.close();
    }

    /// The underlying packet stream
    pub fn stream(&self) -> &PacketStream {
        &self.stream
    }

    /// True for a 2xx response received in full
    pub fn ok(&self) -> bool {
        self.session.borrow().ok()
    }

    /// Check if the exchange is settled
    pub fn is_finished(&self) -> bool {
        self.session.borrow().is_finished()
    }

    /// Response status code; 0 before the status line arrived
    pub fn status_code(&self) -> u16 {
        self.session.borrow().response().status_code()
    }

    /// Response status line
    pub fn response_status(&self) -> String {
        self.session.borrow().response().status_line().to_string()
    }

    /// Response headers
    pub fn response_headers(&self) -> Ref<'_, Headers> {
        Ref::map(self.session.borrow(), |session| session.response().headers())
    }

    /// Chunked trailer headers
    pub fn trailers(&self) -> Ref<'_, Headers> {
        Ref::map(self.session.borrow(), |session| session.response().trailers())
    }

    /// Declared `Content-Length`
    pub fn content_length(&self) -> Option<usize> {
        self.session.borrow().response().content_length()
    }

    /// Response body
    pub fn body(&self) -> Ref<'_, [u8]> {
        Ref::map(self.session.borrow(), |session| session.response().body())
    }

    /// Response body length
    pub fn body_length(&self) -> usize {
        self.session.borrow().response().body().len()
    }

    /// Response body as text, invalid UTF-8 replaced
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }

    /// Download progress in percent; 0 without a `Content-Length`
    pub fn percent_done(&self) -> usize {
        self.session.borrow().response().percent_done()
    }
}
