//! # Velocity command publisher
//!
//! Publishes velocity commands to the drive base. The socket is bound here so the drive base can
//! come and go without the controller noticing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::drive::VelocityCmd,
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::trace;

use crate::controller::{CmdPublisher, PublishError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CmdVelPublisher {
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CmdVelPublisherError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the command: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdVelPublisher {
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, CmdVelPublisherError> {
        let socket_options = SocketOptions {
            bind: true,
            linger: 100,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::PUB, socket_options, &params.cmd_vel_endpoint)
            .map_err(CmdVelPublisherError::SocketError)?;

        Ok(Self { socket })
    }

    pub fn send(&mut self, cmd: &VelocityCmd) -> Result<(), CmdVelPublisherError> {
        let cmd_str =
            serde_json::to_string(cmd).map_err(CmdVelPublisherError::SerializationError)?;

        self.socket
            .send(&cmd_str, 0)
            .map_err(CmdVelPublisherError::SendError)?;

        trace!("Sent {:?}", cmd);

        Ok(())
    }
}

impl CmdPublisher for CmdVelPublisher {
    fn publish(&mut self, cmd: &VelocityCmd) -> Result<(), PublishError> {
        self.send(cmd).map_err(|e| e.into())
    }
}
