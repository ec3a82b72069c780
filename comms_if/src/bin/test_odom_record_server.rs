//! Bench stand-in for the odometry recorder.
//!
//! Accepts a single goal, then publishes a feedback event every second with a distance growing by
//! 0.1 m, and finishes with a result holding one point per feedback.

use comms_if::{
    action::odom_record::{GoalResponse, OdomPoint, OdomRecordEvent, OdomRecordGoal},
    net::{MonitoredSocket, SocketOptions},
};
use std::{thread, time::Duration};

/// Number of feedback events to publish before the result.
const NUM_FEEDBACKS: usize = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = zmq::Context::new();

    let goal_socket = MonitoredSocket::new(
        &ctx,
        zmq::REP,
        SocketOptions {
            bind: true,
            ..Default::default()
        },
        "tcp://*:5011",
    )?;
    let event_socket = MonitoredSocket::new(
        &ctx,
        zmq::PUB,
        SocketOptions {
            bind: true,
            ..Default::default()
        },
        "tcp://*:5012",
    )?;

    println!("Odometry recorder running on ports 5011 (goal) and 5012 (events)");

    // Wait for the goal
    loop {
        let msg = goal_socket.recv_msg(0)?;

        let accepted = matches!(
            msg.as_str().map(serde_json::from_str::<OdomRecordGoal>),
            Some(Ok(_))
        );

        goal_socket.send(&serde_json::to_string(&GoalResponse { accepted })?, 0)?;

        if accepted {
            println!("Goal accepted, recording");
            break;
        }

        println!("Invalid goal rejected");
    }

    let mut list_of_odoms = Vec::with_capacity(NUM_FEEDBACKS);

    for i in 0..NUM_FEEDBACKS {
        thread::sleep(Duration::from_secs(1));

        let current_total_m = 0.1 * (i + 1) as f64;
        list_of_odoms.push(OdomPoint {
            x: current_total_m,
            y: 0.0,
            z: 0.0,
        });

        event_socket.send(
            &serde_json::to_string(&OdomRecordEvent::Feedback { current_total_m })?,
            0,
        )?;
    }

    event_socket.send(
        &serde_json::to_string(&OdomRecordEvent::Result { list_of_odoms })?,
        0,
    )?;

    println!("Recording complete");

    // Give the subscriber a moment to read the result before the socket goes
    thread::sleep(Duration::from_secs(1));

    Ok(())
}
