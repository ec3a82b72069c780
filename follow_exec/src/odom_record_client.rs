//! # Odometry record client
//!
//! Action client for the odometry recorder. The goal goes out on a request-response socket, the
//! feedback and the result come back on a subscriber socket.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    action::odom_record::{GoalResponse, OdomRecordEvent, OdomRecordGoal},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

use crate::odom_session::OdomRecorder;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct OdomRecordClient {
    /// Goal request-response socket
    goal: MonitoredSocket,

    /// Feedback and result subscriber socket
    events: MonitoredSocket,

    endpoint: String,

    /// True if waiting for the goal response
    awaiting_response: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OdomRecordClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the recorder")]
    NotConnected,

    #[error("Could not send the goal to the recorder: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the recorder: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the goal: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the message from the recorder: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The recorder sent a message which was not valid UTF-8")]
    NonUtf8Message,

    #[error("A goal has already been sent and is still awaiting a response")]
    WaitingForResponse,

    #[error("Cannot recieve a goal response as no goal has been sent")]
    NoGoalSent,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OdomRecordClient {
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, OdomRecordClientError> {
        let goal_opts = SocketOptions {
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

        let event_opts = SocketOptions {
            connect_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            ..Default::default()
        };

        let goal = MonitoredSocket::new(ctx, zmq::REQ, goal_opts, &params.odom_goal_endpoint)
            .map_err(OdomRecordClientError::SocketError)?;

        // Subscribe straight away so no event published after the goal is accepted is missed
        let events = MonitoredSocket::new(ctx, zmq::SUB, event_opts, &params.odom_event_endpoint)
            .map_err(OdomRecordClientError::SocketError)?;

        Ok(Self {
            goal,
            events,
            endpoint: params.odom_goal_endpoint.clone(),
            awaiting_response: false,
        })
    }

    /// True if both sockets are connected.
    pub fn is_connected(&self) -> bool {
        self.goal.connected() && self.events.connected()
    }

    pub fn send_goal(&mut self, goal: OdomRecordGoal) -> Result<(), OdomRecordClientError> {
        if !self.is_connected() {
            return Err(OdomRecordClientError::NotConnected);
        }

        if self.awaiting_response {
            return Err(OdomRecordClientError::WaitingForResponse);
        }

        let goal_str =
            serde_json::to_string(&goal).map_err(OdomRecordClientError::SerializationError)?;

        self.goal
            .send(&goal_str, 0)
            .map_err(OdomRecordClientError::SendError)?;

        self.awaiting_response = true;

        Ok(())
    }

    /// Get the recorder's answer to the goal, `Ok(None)` if it hasn't arrived yet.
    pub fn receive_goal_response(&mut self) -> Result<Option<GoalResponse>, OdomRecordClientError> {
        if !self.awaiting_response {
            return Err(OdomRecordClientError::NoGoalSent);
        }

        let response_str = match recv_str(&self.goal)? {
            Some(s) => s,
            None => return Ok(None),
        };

        self.awaiting_response = false;

        serde_json::from_str(&response_str)
            .map(Some)
            .map_err(OdomRecordClientError::DeserializeError)
    }

    /// Get the next feedback or result, `Ok(None)` if none is waiting.
    pub fn receive_event(&mut self) -> Result<Option<OdomRecordEvent>, OdomRecordClientError> {
        match recv_str(&self.events)? {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(OdomRecordClientError::DeserializeError),
            None => Ok(None),
        }
    }
}

impl OdomRecorder for OdomRecordClient {
    type Error = OdomRecordClientError;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_reachable(&self) -> bool {
        self.is_connected()
    }

    fn send_goal(&mut self, goal: OdomRecordGoal) -> Result<(), Self::Error> {
        OdomRecordClient::send_goal(self, goal)
    }

    fn poll_goal_response(&mut self) -> Result<Option<GoalResponse>, Self::Error> {
        self.receive_goal_response()
    }

    fn poll_event(&mut self) -> Result<Option<OdomRecordEvent>, Self::Error> {
        self.receive_event()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read a string from the socket, `None` if nothing arrived before the receive timeout.
fn recv_str(socket: &MonitoredSocket) -> Result<Option<String>, OdomRecordClientError> {
    match socket.recv_string(0) {
        Ok(Ok(s)) => Ok(Some(s)),
        Ok(Err(_)) => Err(OdomRecordClientError::NonUtf8Message),
        Err(zmq::Error::EAGAIN) => Ok(None),
        Err(e) => Err(OdomRecordClientError::RecvError(e)),
    }
}
