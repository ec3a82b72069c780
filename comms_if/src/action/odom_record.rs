//! # Odometry recording action
//!
//! The recorder logs the robot's odometry from the moment a goal is accepted. While recording it
//! publishes the total distance travelled so far, and once the robot has completed a lap it ends
//! the session with the full list of recorded positions.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Goal asking the recorder to start recording. Carries no payload.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct OdomRecordGoal;

/// The recorder's answer to a goal.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GoalResponse {
    pub accepted: bool,
}

/// A recorded position of the robot in the odometry frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct OdomPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Messages streamed by the recorder after a goal has been accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum OdomRecordEvent {
    /// Progress notification.
    Feedback {
        /// Total distance travelled since the goal was accepted, in meters.
        current_total_m: f64,
    },

    /// Terminal result, no further events follow.
    Result {
        /// Every position recorded during the session, oldest first.
        list_of_odoms: Vec<OdomPoint>,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_event_json_format() {
        let feedback: OdomRecordEvent =
            serde_json::from_str(r#"{"Feedback":{"current_total_m":1.5}}"#).unwrap();
        assert_eq!(
            feedback,
            OdomRecordEvent::Feedback {
                current_total_m: 1.5
            }
        );

        let result: OdomRecordEvent = serde_json::from_str(
            r#"{"Result":{"list_of_odoms":[{"x":0.0,"y":0.0,"z":0.0},{"x":1.0,"y":0.5,"z":0.0}]}}"#,
        )
        .unwrap();

        match result {
            OdomRecordEvent::Result { list_of_odoms } => {
                assert_eq!(list_of_odoms.len(), 2);
                assert_eq!(list_of_odoms[1].y, 0.5);
            }
            e => panic!("Expected a result, got {:?}", e),
        }
    }
}
