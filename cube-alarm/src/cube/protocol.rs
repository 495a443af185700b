//! GAN Gen3 notification decoding.
//!
//! Frames here are plaintext, after [`super::cipher`]. Byte 0 is the `0x55` magic and byte 1 the
//! event type. Field offsets below are bit offsets from the start of the
//! frame, MSB first, which is how the cube packs its sub-byte fields.

use bitvec::prelude::*;

use super::{CubeMove, Direction, Face};

const MAGIC: u8 = 0x55;

const EVENT_MOVE: u8 = 0x01;
const EVENT_FACELETS: u8 = 0x02;
const EVENT_BATTERY: u8 = 0x04;

const MOVE_LEN: usize = 16;
const FACELETS_LEN: usize = 20;
const BATTERY_LEN: usize = 4;

/// Face codes in the move frame, indexed by [`Face`] order.
const FACE_CODES: [(u8, Face); 6] = [
    (2, Face::U),
    (32, Face::R),
    (8, Face::F),
    (1, Face::D),
    (16, Face::L),
    (4, Face::B),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("bad magic {0:#04x}")]
    BadMagic(u8),

    #[error("event {event:#04x} truncated: {len} bytes, need {min}")]
    Truncated { event: u8, len: usize, min: usize },

    #[error("unknown face code {0:#04x}")]
    UnknownFace(u8),

    #[error("unknown turn direction {0}")]
    UnknownDirection(u8),

    #[error("encrypted frame of {0} bytes, need at least 16")]
    Ciphertext(usize),
}

/// Commands the host writes to the cube. Each is a 16-byte frame, encrypted
/// like a notification before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeRequest {
    Hardware,
    Facelets,
    Battery,
    /// Make the cube consider its current state solved.
    Reset,
}

impl CubeRequest {
    pub fn encode(self) -> [u8; 16] {
        let mut frame = [0u8; 16];
        frame[0] = match self {
            CubeRequest::Hardware => 0x01,
            CubeRequest::Facelets => 0x02,
            CubeRequest::Battery => 0x03,
            CubeRequest::Reset => 0x04,
        };
        frame
    }
}

/// A decoded cube notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Move(CubeMove),

    /// Full cube state, reduced to whether it is solved.
    Facelets { serial: u16, solved: bool },

    Battery(u8),
}

/// Decode one frame. `Ok(None)` is a well-formed frame of a kind the link
/// does not track.
pub fn decode(frame: &[u8]) -> Result<Option<Notification>, FrameError> {
    let (&magic, rest) = frame.split_first().ok_or(FrameError::Empty)?;
    if magic != MAGIC {
        return Err(FrameError::BadMagic(magic));
    }
    let Some(&event) = rest.first() else {
        return Err(FrameError::Truncated {
            event: 0,
            len: frame.len(),
            min: 2,
        });
    };

    match event {
        EVENT_MOVE => {
            require(frame, event, MOVE_LEN)?;
            decode_move(frame).map(|m| Some(Notification::Move(m)))
        }
        // Shorter 0x02 frames are status telemetry, not facelets.
        EVENT_FACELETS if frame.len() < FACELETS_LEN => Ok(None),
        EVENT_FACELETS => Ok(Some(decode_facelets(frame))),
        EVENT_BATTERY => {
            require(frame, event, BATTERY_LEN)?;
            let level = if frame[2] <= 100 { frame[2] } else { frame[3] };
            Ok(Some(Notification::Battery(level.min(100))))
        }
        _ => Ok(None),
    }
}

fn require(frame: &[u8], event: u8, min: usize) -> Result<(), FrameError> {
    if frame.len() < min {
        return Err(FrameError::Truncated {
            event,
            len: frame.len(),
            min,
        });
    }
    Ok(())
}

fn decode_move(frame: &[u8]) -> Result<CubeMove, FrameError> {
    let bits = frame.view_bits::<Msb0>();

    let direction = match bits[72..74].load_be::<u8>() {
        0 => Direction::Clockwise,
        1 => Direction::CounterClockwise,
        other => return Err(FrameError::UnknownDirection(other)),
    };

    let code = bits[74..80].load_be::<u8>();
    let face = FACE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, face)| *face)
        .ok_or(FrameError::UnknownFace(code))?;

    Ok(CubeMove {
        face,
        direction,
        serial: u16::from_le_bytes([frame[7], frame[8]]),
    })
}

fn decode_facelets(frame: &[u8]) -> Notification {
    let bits = frame.view_bits::<Msb0>();
    let field = |start: usize, width: usize| bits[start..start + width].load_be::<u8>();

    // The last corner and edge are implied by the other seven and eleven.
    let mut cp: Vec<u8> = (0..7).map(|i| field(40 + i * 3, 3)).collect();
    let mut co: Vec<u8> = (0..7).map(|i| field(61 + i * 2, 2)).collect();
    let mut ep: Vec<u8> = (0..11).map(|i| field(77 + i * 4, 4)).collect();
    let mut eo: Vec<u8> = (0..11).map(|i| field(121 + i, 1)).collect();

    let sum = |v: &[u8]| v.iter().map(|&x| u32::from(x)).sum::<u32>();
    cp.push(28u32.wrapping_sub(sum(&cp)) as u8);
    co.push(((3 - sum(&co) % 3) % 3) as u8);
    ep.push(66u32.wrapping_sub(sum(&ep)) as u8);
    eo.push(((2 - sum(&eo) % 2) % 2) as u8);

    let identity = |v: &[u8]| v.iter().enumerate().all(|(i, &x)| usize::from(x) == i);
    let solved = identity(&cp)
        && identity(&ep)
        && co.iter().all(|&x| x == 0)
        && eo.iter().all(|&x| x == 0);

    Notification::Facelets {
        serial: u16::from_le_bytes([frame[3], frame[4]]),
        solved,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use test_case::test_case;

    use super::*;

    /// Build a move frame for `face` code and direction, with `serial`.
    pub(crate) fn move_frame(face_code: u8, direction: u8, serial: u16) -> Vec<u8> {
        let mut frame = vec![0u8; MOVE_LEN];
        frame[0] = MAGIC;
        frame[1] = EVENT_MOVE;
        frame[7..9].copy_from_slice(&serial.to_le_bytes());
        let bits = frame.view_bits_mut::<Msb0>();
        bits[72..74].store_be(direction);
        bits[74..80].store_be(face_code);
        frame
    }

    /// Build a facelets frame from full permutation and orientation arrays.
    /// Only the encoded prefix of each array reaches the frame.
    pub(crate) fn facelets_frame(cp: [u8; 8], co: [u8; 8], ep: [u8; 12], eo: [u8; 12]) -> Vec<u8> {
        let mut frame = vec![0u8; FACELETS_LEN];
        frame[0] = MAGIC;
        frame[1] = EVENT_FACELETS;
        let bits = frame.view_bits_mut::<Msb0>();
        for i in 0..7 {
            bits[40 + i * 3..43 + i * 3].store_be(cp[i]);
            bits[61 + i * 2..63 + i * 2].store_be(co[i]);
        }
        for i in 0..11 {
            bits[77 + i * 4..81 + i * 4].store_be(ep[i]);
            bits[121 + i..122 + i].store_be(eo[i]);
        }
        frame
    }

    pub(crate) fn solved_frame() -> Vec<u8> {
        facelets_frame(
            [0, 1, 2, 3, 4, 5, 6, 7],
            [0; 8],
            [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            [0; 12],
        )
    }

    pub(crate) fn scrambled_frame() -> Vec<u8> {
        // R: corners 0,3,7,4 cycle with twists, edges 0,4,8,7 cycle.
        facelets_frame(
            [4, 1, 2, 0, 7, 5, 6, 3],
            [2, 0, 0, 1, 1, 0, 0, 2],
            [8, 1, 2, 3, 0, 5, 6, 4, 7, 9, 10, 11],
            [0; 12],
        )
    }

    #[test_case(2, Face::U ; "up")]
    #[test_case(32, Face::R ; "right")]
    #[test_case(8, Face::F ; "front")]
    #[test_case(1, Face::D ; "down")]
    #[test_case(16, Face::L ; "left")]
    #[test_case(4, Face::B ; "back")]
    fn decodes_move_faces(code: u8, face: Face) {
        let decoded = decode(&move_frame(code, 0, 0x1234)).unwrap();
        assert_eq!(
            decoded,
            Some(Notification::Move(CubeMove {
                face,
                direction: Direction::Clockwise,
                serial: 0x1234,
            }))
        );
    }

    #[test]
    fn decodes_counter_clockwise() {
        let Some(Notification::Move(m)) = decode(&move_frame(32, 1, 9)).unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(m.direction, Direction::CounterClockwise);
        assert_eq!(m.to_string(), "R'");
    }

    #[test]
    fn solved_state_detected() {
        assert!(matches!(
            decode(&solved_frame()),
            Ok(Some(Notification::Facelets { solved: true, .. }))
        ));
        assert!(matches!(
            decode(&scrambled_frame()),
            Ok(Some(Notification::Facelets { solved: false, .. }))
        ));
    }

    #[test]
    fn twisted_corner_is_not_solved() {
        let frame = facelets_frame(
            [0, 1, 2, 3, 4, 5, 6, 7],
            [1, 0, 0, 0, 0, 0, 0, 2],
            [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            [0; 12],
        );
        assert!(matches!(
            decode(&frame),
            Ok(Some(Notification::Facelets { solved: false, .. }))
        ));
    }

    #[test_case(&[0x55, 0x04, 80, 0], 80 ; "level in byte two")]
    #[test_case(&[0x55, 0x04, 0xff, 42], 42 ; "level in byte three")]
    #[test_case(&[0x55, 0x04, 0xff, 0xff], 100 ; "capped")]
    fn decodes_battery(frame: &[u8], level: u8) {
        assert_eq!(decode(frame), Ok(Some(Notification::Battery(level))));
    }

    #[test]
    fn ignores_untracked_events() {
        assert_eq!(decode(&[0x55, 0x05, 0, 0]), Ok(None));
        assert_eq!(decode(&[0x55, EVENT_FACELETS, 0, 0]), Ok(None));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(decode(&[]), Err(FrameError::Empty));
        assert_eq!(decode(&[0x42, 0x01]), Err(FrameError::BadMagic(0x42)));
        assert!(matches!(
            decode(&[0x55, EVENT_MOVE, 0, 0]),
            Err(FrameError::Truncated { event: EVENT_MOVE, .. })
        ));
        assert_eq!(
            decode(&move_frame(3, 0, 0)),
            Err(FrameError::UnknownFace(3))
        );
        assert_eq!(
            decode(&move_frame(2, 2, 0)),
            Err(FrameError::UnknownDirection(2))
        );
    }

    #[test_case(CubeRequest::Hardware, 0x01 ; "hardware")]
    #[test_case(CubeRequest::Facelets, 0x02 ; "facelets")]
    #[test_case(CubeRequest::Battery, 0x03 ; "battery")]
    #[test_case(CubeRequest::Reset, 0x04 ; "reset")]
    fn encodes_requests(request: CubeRequest, opcode: u8) {
        let frame = request.encode();
        assert_eq!(frame[0], opcode);
        assert!(frame[1..].iter().all(|&b| b == 0));
    }
}
