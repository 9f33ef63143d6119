//! Outbound command encoding
//! Robot commands are parenthesized, comma-separated ASCII tuples such as
//! `(d,h)` or `(m,0,0,50,50)`. Sensor-ball configuration writes are raw bytes.

use crate::error::{DecodeError, EncodeError};

/// Number of addressable pixels on the robot
pub const PIXEL_COUNT: usize = 8;

/// Largest color the robot accepts (24-bit RGB as a decimal integer)
const MAX_PIXEL_COLOR: u32 = 0xFF_FFFF;

/// Faces the robot display can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// (d,a)
    Angry,
    /// (d,h)
    Happy,
    /// (d,m)
    Confused,
    /// (d,r)
    Worried,
    /// (d,y)
    Annoyed,
    /// (d,l)
    Sleeping,
    /// (d,f)
    Fear,
    /// (d,d)
    Disgust,
    /// (d,e)
    Engaged,
    /// (d,o)
    Love,
    /// (d,s)
    Sad,
    /// (d,w)
    Wrong,
    /// (d,p)
    Surprise,
    /// (d,b)
    Blink,
    /// (d,n)
    Neutral,
}

impl Face {
    pub const ALL: [Face; 15] = [
        Face::Angry,
        Face::Happy,
        Face::Confused,
        Face::Worried,
        Face::Annoyed,
        Face::Sleeping,
        Face::Fear,
        Face::Disgust,
        Face::Engaged,
        Face::Love,
        Face::Sad,
        Face::Wrong,
        Face::Surprise,
        Face::Blink,
        Face::Neutral,
    ];

    /// Single-character protocol code
    pub fn code(self) -> char {
        match self {
            Self::Angry => 'a',
            Self::Happy => 'h',
            Self::Confused => 'm',
            Self::Worried => 'r',
            Self::Annoyed => 'y',
            Self::Sleeping => 'l',
            Self::Fear => 'f',
            Self::Disgust => 'd',
            Self::Engaged => 'e',
            Self::Love => 'o',
            Self::Sad => 's',
            Self::Wrong => 'w',
            Self::Surprise => 'p',
            Self::Blink => 'b',
            Self::Neutral => 'n',
        }
    }

    /// Host-facing menu name
    pub fn name(self) -> &'static str {
        match self {
            Self::Angry => "angry",
            Self::Happy => "happy",
            Self::Confused => "confused",
            Self::Worried => "worried",
            Self::Annoyed => "annoyed",
            Self::Sleeping => "sleeping",
            Self::Fear => "fear",
            Self::Disgust => "disgust",
            Self::Engaged => "engaged",
            Self::Love => "love",
            Self::Sad => "sad",
            Self::Wrong => "wrong",
            Self::Surprise => "surprise",
            Self::Blink => "blink",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|face| face.name() == name)
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|face| face.code() == code)
    }
}

/// Drive directions, each encoded as a pair of motor direction bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 0,0
    Forward,
    /// 1,1
    Backward,
    /// 0,1
    Left,
    /// 1,0
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
    ];

    pub fn bits(self) -> (u8, u8) {
        match self {
            Self::Forward => (0, 0),
            Self::Backward => (1, 1),
            Self::Left => (0, 1),
            Self::Right => (1, 0),
        }
    }

    pub fn from_bits(bits: (u8, u8)) -> Option<Self> {
        Self::ALL.into_iter().find(|dir| dir.bits() == bits)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dir| dir.name() == name)
    }
}

/// Pen servo positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenPosition {
    Up,
    Down,
}

impl PenPosition {
    pub fn angle(self) -> u8 {
        match self {
            Self::Up => 0,
            Self::Down => 45,
        }
    }

    pub fn from_angle(angle: u8) -> Option<Self> {
        match angle {
            0 => Some(Self::Up),
            45 => Some(Self::Down),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// The two accelerometers inside the sensor ball
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Accelerometer {
    First,
    Second,
}

/// Characteristics that take a one-byte configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigTarget {
    Accelerometer(Accelerometer),
    SensorStream,
}

/// Every outbound operation the session can carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandMessage {
    SetFace(Face),
    ClearDisplay,
    /// Eight 24-bit colors as decimal integers
    SetPixels([u32; PIXEL_COUNT]),
    Drive { direction: Direction, steps: i64 },
    Stop,
    MovePen(PenPosition),
    /// Written verbatim, never validated
    RawText(String),
    SensorConfig { target: ConfigTarget, value: u8 },
    ThresholdConfig { accelerometer: Accelerometer, threshold: u16 },
}

impl CommandMessage {
    pub fn pixels_off() -> Self {
        Self::SetPixels([0; PIXEL_COUNT])
    }
}

/// Encodes a command into its single wire representation.
pub fn encode(message: &CommandMessage) -> Result<Vec<u8>, EncodeError> {
    let text = match message {
        CommandMessage::SetFace(face) => format!("(d,{})", face.code()),
        CommandMessage::ClearDisplay => "(d,c)".to_string(),
        CommandMessage::SetPixels(colors) => {
            if let Some((index, value)) = colors
                .iter()
                .enumerate()
                .find(|(_, value)| **value > MAX_PIXEL_COLOR)
            {
                return Err(EncodeError::PixelOutOfRange { index, value: *value });
            }
            let joined: Vec<String> = colors.iter().map(u32::to_string).collect();
            format!("(p,{})", joined.join(","))
        }
        CommandMessage::Drive { direction, steps } => {
            if *steps < 0 {
                return Err(EncodeError::NegativeSteps(*steps));
            }
            let (left, right) = direction.bits();
            format!("(m,{left},{right},{steps},{steps})")
        }
        CommandMessage::Stop => "(m,s)".to_string(),
        CommandMessage::MovePen(position) => format!("(u,{})", position.angle()),
        CommandMessage::RawText(text) => text.clone(),
        CommandMessage::SensorConfig { value, .. } => return Ok(vec![*value]),
        CommandMessage::ThresholdConfig { threshold, .. } => {
            return Ok(threshold.to_le_bytes().to_vec());
        }
    };
    Ok(text.into_bytes())
}

/// Parses robot command text back into a structured command.
pub fn parse_command(text: &str) -> Result<CommandMessage, DecodeError> {
    let fields = tuple_fields(text)?;
    let (tag, args) = fields
        .split_first()
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;
    let malformed = || DecodeError::Malformed(text.to_string());

    match (*tag, args) {
        ("d", ["c"]) => Ok(CommandMessage::ClearDisplay),
        ("d", [code]) => single_char(code)
            .and_then(Face::from_code)
            .map(CommandMessage::SetFace)
            .ok_or_else(|| DecodeError::UnknownDiscriminator(code.to_string())),
        ("p", colors) if colors.len() == PIXEL_COUNT => {
            let mut parsed = [0u32; PIXEL_COUNT];
            for (slot, value) in parsed.iter_mut().zip(colors) {
                *slot = value.parse().map_err(|_| malformed())?;
            }
            Ok(CommandMessage::SetPixels(parsed))
        }
        ("m", ["s"]) => Ok(CommandMessage::Stop),
        ("m", [left, right, steps, steps_again]) => {
            let bits = (
                left.parse().map_err(|_| malformed())?,
                right.parse().map_err(|_| malformed())?,
            );
            let direction = Direction::from_bits(bits).ok_or_else(malformed)?;
            let steps: i64 = steps.parse().map_err(|_| malformed())?;
            if steps_again.parse::<i64>().map_err(|_| malformed())? != steps {
                return Err(malformed());
            }
            Ok(CommandMessage::Drive { direction, steps })
        }
        ("u", [angle]) => angle
            .parse()
            .ok()
            .and_then(PenPosition::from_angle)
            .map(CommandMessage::MovePen)
            .ok_or_else(malformed),
        (other, _) if !matches!(other, "d" | "p" | "m" | "u") => {
            Err(DecodeError::UnknownDiscriminator(other.to_string()))
        }
        _ => Err(malformed()),
    }
}

/// Splits `(a,b,c)` into its trimmed fields.
pub(crate) fn tuple_fields(text: &str) -> Result<Vec<&str>, DecodeError> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;
    Ok(inner.split(',').map(str::trim).collect())
}

fn single_char(field: &str) -> Option<char> {
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
