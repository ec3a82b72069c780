//! # Find wall client
//!
//! Request-response client for the find wall service. The request is sent without blocking and
//! the response polled for, so the caller can give up waiting at any point.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    srv::find_wall::{FindWallRequest, FindWallResponse},
};

use crate::gate::WallFinder;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct FindWallClient {
    /// Request-response socket for the service
    reqrep: MonitoredSocket,

    endpoint: String,

    /// True if waiting for a response on reqrep.
    awaiting_response: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FindWallClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the service")]
    NotConnected,

    #[error("Could not send the request to the service: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the service: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the service: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The service responded with a message which was not valid UTF-8")]
    NonUtf8Response,

    #[error("A request has already been made and is still awaiting a response")]
    WaitingForResponse,

    #[error("Cannot recieve a response as no request has been made")]
    NoRequestMade,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FindWallClient {
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, FindWallClientError> {
        let reqrep_opts = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            send_timeout: 10,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let reqrep = MonitoredSocket::new(ctx, zmq::REQ, reqrep_opts, &params.find_wall_endpoint)
            .map_err(FindWallClientError::SocketError)?;

        Ok(Self {
            reqrep,
            endpoint: params.find_wall_endpoint.clone(),
            awaiting_response: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.reqrep.connected()
    }

    /// Send a find wall request to the service.
    pub fn request(&mut self, request: FindWallRequest) -> Result<(), FindWallClientError> {
        if !self.reqrep.connected() {
            return Err(FindWallClientError::NotConnected);
        }

        if self.awaiting_response {
            return Err(FindWallClientError::WaitingForResponse);
        }

        let request_str =
            serde_json::to_string(&request).map_err(FindWallClientError::SerializationError)?;

        self.reqrep
            .send(&request_str, 0)
            .map_err(FindWallClientError::SendError)?;

        self.awaiting_response = true;

        Ok(())
    }

    /// Get the service's response.
    ///
    /// If the response hasn't arrived yet `Ok(None)` is returned. The service only answers once
    /// it has finished looking for the wall, which can take a while.
    pub fn receive_response(&mut self) -> Result<Option<FindWallResponse>, FindWallClientError> {
        if !self.awaiting_response {
            return Err(FindWallClientError::NoRequestMade);
        }

        let response_str = match self.reqrep.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(FindWallClientError::NonUtf8Response),
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(FindWallClientError::RecvError(e)),
        };

        self.awaiting_response = false;

        serde_json::from_str(&response_str)
            .map(Some)
            .map_err(FindWallClientError::DeserializeError)
    }
}

impl WallFinder for FindWallClient {
    type Error = FindWallClientError;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_reachable(&self) -> bool {
        self.is_connected()
    }

    fn send_request(&mut self, request: FindWallRequest) -> Result<(), Self::Error> {
        self.request(request)
    }

    fn poll_response(&mut self) -> Result<Option<FindWallResponse>, Self::Error> {
        self.receive_response()
    }
}
