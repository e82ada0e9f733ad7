use crate::types::{
    Command, NUM_LANDMARKS,
    landmark::{FINGER_TIPS, INDEX_TIP, THUMB_IP, THUMB_MCP, THUMB_TIP, WRIST},
};

/// Horizontal distance between index tip and wrist that counts as pointing sideways.
const POINTING_OFFSET: f32 = 0.1;

/// Counts extended fingers (0..=5) on a mirrored, camera-facing right hand.
///
/// The thumb is extended when its tip lies left of the joint before it; the
/// other fingers when their tip lies above the joint two positions below.
/// Returns `None` for sets with fewer than 21 points.
pub fn count_extended_fingers(points: &[(f32, f32)]) -> Option<u8> {
    if points.len() < NUM_LANDMARKS {
        return None;
    }

    let mut extended = 0;

    if points[THUMB_TIP].0 < points[THUMB_IP].0 {
        extended += 1;
    }

    for tip in FINGER_TIPS {
        if points[tip].1 < points[tip - 2].1 {
            extended += 1;
        }
    }

    Some(extended)
}

/// Maps one hand's landmarks to a motion command.
///
/// Rules are checked in priority order and the first match wins. With a
/// single extended finger the left/right checks look at the index tip and the
/// backward check at the thumb, whichever finger actually produced the count.
pub fn classify(points: &[(f32, f32)]) -> Option<Command> {
    let extended = count_extended_fingers(points)?;

    let wrist = points[WRIST];
    let index_tip = points[INDEX_TIP];
    let thumb_tip = points[THUMB_TIP];
    let thumb_mcp = points[THUMB_MCP];

    match extended {
        5 => Some(Command::Forward),
        0 => Some(Command::Stop),
        1 if index_tip.0 < wrist.0 - POINTING_OFFSET => Some(Command::Left),
        1 if index_tip.0 > wrist.0 + POINTING_OFFSET => Some(Command::Right),
        1 if thumb_tip.1 > thumb_mcp.1 => Some(Command::Backward),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn open_palm_is_forward() {
        let points = open_palm();
        assert_eq!(count_extended_fingers(&points), Some(5));
        assert_eq!(classify(&points), Some(Command::Forward));
    }

    #[test]
    fn fist_is_stop() {
        let points = fist();
        assert_eq!(count_extended_fingers(&points), Some(0));
        assert_eq!(classify(&points), Some(Command::Stop));
    }

    #[test]
    fn index_pointing_sideways() {
        assert_eq!(classify(&pointing(-0.15)), Some(Command::Left));
        assert_eq!(classify(&pointing(0.15)), Some(Command::Right));
    }

    #[test]
    fn pointing_threshold_is_strict() {
        // Exactly on the threshold matches neither side; thumb is not down either.
        let points = pointing(-0.1);
        assert_eq!(count_extended_fingers(&points), Some(1));
        assert_eq!(classify(&points), None);
    }

    #[test]
    fn thumb_down_is_backward() {
        let mut points = fist();
        extend_thumb(&mut points);
        points[4].1 = points[2].1 + 0.1;
        assert_eq!(count_extended_fingers(&points), Some(1));
        assert_eq!(classify(&points), Some(Command::Backward));
    }

    #[test]
    fn thumb_up_with_centered_index_is_unrecognized() {
        let mut points = fist();
        extend_thumb(&mut points);
        assert_eq!(classify(&points), None);
    }

    #[test]
    fn single_finger_rules_ignore_which_finger_is_extended() {
        // Pinky extended, but the index tip (folded) sits left of the wrist.
        let mut points = fist();
        extend_finger(&mut points, 20);
        points[8].0 = points[0].0 - 0.2;
        assert_eq!(classify(&points), Some(Command::Left));

        // Middle finger extended, thumb tip below point 2.
        let mut points = fist();
        extend_finger(&mut points, 12);
        points[4].1 = points[2].1 + 0.05;
        assert_eq!(classify(&points), Some(Command::Backward));
    }

    #[test]
    fn sideways_rules_win_over_backward() {
        let mut points = pointing(0.2);
        points[4].1 = points[2].1 + 0.1;
        assert_eq!(classify(&points), Some(Command::Right));
    }

    #[test]
    fn other_counts_are_unrecognized() {
        let mut points = fist();
        extend_finger(&mut points, 8);
        extend_finger(&mut points, 12);
        assert_eq!(count_extended_fingers(&points), Some(2));
        assert_eq!(classify(&points), None);

        let mut points = open_palm();
        points[4].0 = points[3].0 + 0.05;
        assert_eq!(count_extended_fingers(&points), Some(4));
        assert_eq!(classify(&points), None);
    }

    #[test]
    fn every_extension_combination_is_counted_and_classified() {
        for mask in 0u8..32 {
            let mut points = fist();
            if mask & 1 != 0 {
                extend_thumb(&mut points);
            }
            for (bit, tip) in [8, 12, 16, 20].into_iter().enumerate() {
                if mask & (2 << bit) != 0 {
                    extend_finger(&mut points, tip);
                }
            }

            let extended = mask.count_ones() as u8;
            assert_eq!(count_extended_fingers(&points), Some(extended), "mask {mask:05b}");

            // The fist keeps the index tip over the wrist and the thumb tip
            // above point 2, so no single-finger rule fires.
            let expected = match extended {
                5 => Some(Command::Forward),
                0 => Some(Command::Stop),
                _ => None,
            };
            assert_eq!(classify(&points), expected, "mask {mask:05b}");
        }
    }

    #[test]
    fn three_fingers_are_unrecognized() {
        let mut points = fist();
        for tip in [8, 12, 16] {
            extend_finger(&mut points, tip);
        }
        points[8].0 = points[0].0 - 0.3;
        points[4].1 = points[2].1 + 0.1;
        assert_eq!(count_extended_fingers(&points), Some(3));
        assert_eq!(classify(&points), None);
    }

    #[test]
    fn short_landmark_sets_are_rejected() {
        let points = open_palm();
        assert_eq!(count_extended_fingers(&points[..20]), None);
        assert_eq!(classify(&points[..20]), None);
        assert_eq!(classify(&[]), None);
    }
}
