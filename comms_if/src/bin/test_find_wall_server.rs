//! Bench stand-in for the find wall service.
//!
//! Answers every request with the `wall_found` value given as the first argument (`true` if
//! omitted), after waiting a couple of seconds as the real service would while it drives to the
//! wall.

use comms_if::{
    net::{MonitoredSocket, SocketOptions},
    srv::find_wall::{FindWallRequest, FindWallResponse},
};
use std::{env, thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let wall_found = match env::args().nth(1) {
        Some(a) => a.parse::<bool>()?,
        None => true,
    };

    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        bind: true,
        ..Default::default()
    };

    let socket = MonitoredSocket::new(&ctx, zmq::REP, socket_options, "tcp://*:5010")?;

    println!("Find wall server running on port 5010 (wall_found = {})", wall_found);

    loop {
        let msg = socket.recv_msg(0)?;

        match msg.as_str().map(serde_json::from_str::<FindWallRequest>) {
            Some(Ok(_)) => {
                println!("Recieved find wall request, searching...");
                thread::sleep(Duration::from_secs(2));

                let response = serde_json::to_string(&FindWallResponse { wall_found })?;
                socket.send(&response, 0)?;

                println!("Sent {}", response);
            }
            Some(Err(e)) => {
                println!("Invalid request: {}", e);
                socket.send("", 0)?;
            }
            None => {
                println!("Received non UTF-8 data");
                socket.send("", 0)?;
            }
        }
    }
}
