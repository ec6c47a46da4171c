// Touchrelay Output Layer - Frame Encoder
// Serializes the contact table into one kernel event batch per upload

use crate::input::codes::*;
use crate::input::RawEvent;
use crate::state::{Contact, ContactTable};

/// Most contacts written in a single frame. Extra contacts are dropped.
pub const MAX_FRAME_CONTACTS: usize = 20;

/// Events emitted per contact: ABS_X, ABS_Y, MT X, MT Y, tracking id, SYN_MT_REPORT.
const EVENTS_PER_CONTACT: usize = 6;

/// Stateful encoder that tracks the touch/no-touch edge between frames.
///
/// The first frame carrying contacts after a release is prefixed with
/// `BTN_TOUCH=1` / `BTN_TOOL_FINGER=1`. The first empty frame after contacts
/// carries `BTN_TOUCH=0` / `BTN_TOOL_FINGER=0` so the release is explicit.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    touching: bool,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self { touching: false }
    }

    /// Whether the last encoded frame had at least one contact down.
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn reset(&mut self) {
        self.touching = false;
    }

    /// Encode every down contact of `table`, devices first.
    pub fn encode(&mut self, table: &ContactTable) -> Vec<RawEvent> {
        self.encode_contacts(table.active().map(|(_, contact)| contact))
    }

    pub fn encode_contacts<'a>(
        &mut self,
        contacts: impl Iterator<Item = &'a Contact>,
    ) -> Vec<RawEvent> {
        let mut body = Vec::with_capacity(EVENTS_PER_CONTACT * 4 + 4);
        let mut count = 0;

        for contact in contacts.filter(|c| c.is_down) {
            if count == MAX_FRAME_CONTACTS {
                log::trace!("Frame contact cap reached, dropping the rest");
                break;
            }
            let x = contact.position.x as i32;
            let y = contact.position.y as i32;
            body.extend_from_slice(&[
                RawEvent::abs(ABS_X, x),
                RawEvent::abs(ABS_Y, y),
                RawEvent::abs(ABS_MT_POSITION_X, x),
                RawEvent::abs(ABS_MT_POSITION_Y, y),
                RawEvent::abs(ABS_MT_TRACKING_ID, contact.tracking_id),
                RawEvent::mt_report(),
            ]);
            count += 1;
        }

        let mut frame = Vec::with_capacity(body.len() + 4);
        if count > 0 {
            if !self.touching {
                frame.push(RawEvent::key(BTN_TOUCH, 1));
                frame.push(RawEvent::key(BTN_TOOL_FINGER, 1));
                self.touching = true;
            }
            frame.append(&mut body);
        } else {
            frame.push(RawEvent::mt_report());
            if self.touching {
                frame.push(RawEvent::key(BTN_TOUCH, 0));
                frame.push(RawEvent::key(BTN_TOOL_FINGER, 0));
                self.touching = false;
            }
        }
        frame.push(RawEvent::report());
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Vector2;

    fn contact(x: f32, y: f32, id: i32) -> Contact {
        Contact {
            position: Vector2::new(x, y),
            tracking_id: id,
            is_down: true,
        }
    }

    fn has_key(frame: &[RawEvent], code: u16, value: i32) -> bool {
        frame.contains(&RawEvent::key(code, value))
    }

    #[test]
    fn test_first_down_prefixes_button_events() {
        let mut encoder = FrameEncoder::new();
        let contacts = [contact(10.0, 20.0, 10)];
        let frame = encoder.encode_contacts(contacts.iter());

        assert_eq!(frame[0], RawEvent::key(BTN_TOUCH, 1));
        assert_eq!(frame[1], RawEvent::key(BTN_TOOL_FINGER, 1));
        assert_eq!(
            &frame[2..],
            &[
                RawEvent::abs(ABS_X, 10),
                RawEvent::abs(ABS_Y, 20),
                RawEvent::abs(ABS_MT_POSITION_X, 10),
                RawEvent::abs(ABS_MT_POSITION_Y, 20),
                RawEvent::abs(ABS_MT_TRACKING_ID, 10),
                RawEvent::mt_report(),
                RawEvent::report(),
            ]
        );
        assert!(encoder.is_touching());
    }

    #[test]
    fn test_button_events_only_on_edge() {
        let mut encoder = FrameEncoder::new();
        let contacts = [contact(1.0, 1.0, 10)];
        encoder.encode_contacts(contacts.iter());
        let second = encoder.encode_contacts(contacts.iter());
        assert!(!has_key(&second, BTN_TOUCH, 1));
        assert_eq!(second.len(), EVENTS_PER_CONTACT + 1);
    }

    #[test]
    fn test_release_edge() {
        let mut encoder = FrameEncoder::new();
        let contacts = [contact(1.0, 1.0, 10)];
        encoder.encode_contacts(contacts.iter());

        let release = encoder.encode_contacts(std::iter::empty());
        assert_eq!(
            release,
            vec![
                RawEvent::mt_report(),
                RawEvent::key(BTN_TOUCH, 0),
                RawEvent::key(BTN_TOOL_FINGER, 0),
                RawEvent::report(),
            ]
        );
        assert!(!encoder.is_touching());

        // A second empty frame carries no release events
        let idle = encoder.encode_contacts(std::iter::empty());
        assert_eq!(idle, vec![RawEvent::mt_report(), RawEvent::report()]);
    }

    #[test]
    fn test_empty_frame_without_prior_touch() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode_contacts(std::iter::empty());
        assert!(!has_key(&frame, BTN_TOUCH, 0));
        assert_eq!(frame.last(), Some(&RawEvent::report()));
    }

    #[test]
    fn test_up_contacts_are_skipped() {
        let mut encoder = FrameEncoder::new();
        let mut lifted = contact(5.0, 5.0, 11);
        lifted.is_down = false;
        let contacts = [lifted, contact(7.0, 8.0, 12)];
        let frame = encoder.encode_contacts(contacts.iter());
        assert!(frame.contains(&RawEvent::abs(ABS_MT_TRACKING_ID, 12)));
        assert!(!frame.contains(&RawEvent::abs(ABS_MT_TRACKING_ID, 11)));
    }

    #[test]
    fn test_contact_cap() {
        let mut encoder = FrameEncoder::new();
        let contacts: Vec<Contact> = (0..30).map(|i| contact(i as f32, 0.0, 100 + i)).collect();
        let frame = encoder.encode_contacts(contacts.iter());
        let reported = frame.iter().filter(|e| e.is_mt_report()).count();
        assert_eq!(reported, MAX_FRAME_CONTACTS);
        assert_eq!(frame.len(), 2 + MAX_FRAME_CONTACTS * EVENTS_PER_CONTACT + 1);
    }

    #[test]
    fn test_positions_truncate_toward_zero() {
        let mut encoder = FrameEncoder::new();
        let contacts = [contact(10.9, 3.2, 10)];
        let frame = encoder.encode_contacts(contacts.iter());
        assert!(frame.contains(&RawEvent::abs(ABS_MT_POSITION_X, 10)));
        assert!(frame.contains(&RawEvent::abs(ABS_MT_POSITION_Y, 3)));
    }

    #[test]
    fn test_reset_clears_edge_state() {
        let mut encoder = FrameEncoder::new();
        encoder.encode_contacts([contact(1.0, 1.0, 10)].iter());
        encoder.reset();
        let frame = encoder.encode_contacts(std::iter::empty());
        assert!(!has_key(&frame, BTN_TOUCH, 0));
    }
}
