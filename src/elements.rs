/// Number of 1e-7 degree units in one degree (OSM's coordinate precision)
pub const COORD_SCALE: f64 = 10_000_000.0;

const MAX_LON: i64 = 180 * 10_000_000;
const MAX_LAT: i64 = 90 * 10_000_000;

/// Key/value tags of an OSM entity in source order.
pub type Tags = Vec<(String, String)>;

/// Coordinate in 1e-7 degree fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub lon: i32,
    pub lat: i32,
}

impl Location {
    /// Returns `None` if the coordinate is outside of the valid WGS84 range.
    pub fn from_fixed(lon: i64, lat: i64) -> Option<Self> {
        if !(-MAX_LON..=MAX_LON).contains(&lon) || !(-MAX_LAT..=MAX_LAT).contains(&lat) {
            return None;
        }
        Some(Self {
            lon: lon as i32,
            lat: lat as i32,
        })
    }

    /// Rounds degrees to the nearest 1e-7.
    pub fn from_degrees(lon: f64, lat: f64) -> Option<Self> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        Self::from_fixed(
            (lon * COORD_SCALE).round() as i64,
            (lat * COORD_SCALE).round() as i64,
        )
    }

    /// Parses decimal degrees like `-13.3777041` into 1e-7 fixed point.
    ///
    /// Digits are taken from the text, so rounding happens on the 8th
    /// fractional digit (half away from zero) without going through `f64`.
    /// An exponent (`1.5e1`) is accepted. Magnitudes beyond any coordinate
    /// saturate and fail the range check of [`from_fixed`](Self::from_fixed).
    /// Returns `None` for text that is not a decimal number.
    pub fn parse_fixed(text: &str) -> Option<i64> {
        let (negative, rest) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match rest.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (&rest[..pos], rest[pos + 1..].parse::<i32>().ok()?),
            None => (rest, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let digits = int_part.as_bytes().iter().chain(frac_part.as_bytes());
        if !digits.clone().all(u8::is_ascii_digit) {
            return None;
        }

        // number of digits in front of the fixed point
        let point = int_part.len() as i64 + i64::from(exponent) + 7;
        let mut fixed: i64 = 0;
        let mut round_up = false;
        for (pos, &digit) in digits.enumerate() {
            let digit = i64::from(digit - b'0');
            if (pos as i64) < point {
                fixed = fixed.saturating_mul(10).saturating_add(digit);
            } else {
                round_up = pos as i64 == point && digit >= 5;
                break;
            }
        }
        let missing = point - (int_part.len() + frac_part.len()) as i64;
        if missing > 0 {
            fixed = fixed.saturating_mul(10i64.saturating_pow(missing.min(19) as u32));
        }
        if round_up {
            fixed = fixed.saturating_add(1);
        }
        Some(if negative { -fixed } else { fixed })
    }

    pub fn coord(self) -> Coord {
        Coord {
            lon: f64::from(self.lon) / COORD_SCALE,
            lat: f64::from(self.lat) / COORD_SCALE,
        }
    }
}

/// Geographic coordinate in degrees (EPSG:4326)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
}

impl Node {
    pub(crate) fn from_location(id: u64, location: Location) -> Self {
        let Coord { lon, lat } = location.coord();
        Self { id, lon, lat }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Way {
    pub id: u64,
    pub refs: Vec<u64>,
    /// Empty unless tags were requested from the reader
    pub tags: Tags,
}

impl Way {
    /// A way is closed if its first and last node ids are equal.
    pub fn is_closed(&self) -> bool {
        match (self.refs.first(), self.refs.last()) {
            (Some(first), Some(last)) => first == last,
            _ => false,
        }
    }
}

/// Entity decoded from an OSM source, in file order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Node(Node),
    Way(Way),
}
