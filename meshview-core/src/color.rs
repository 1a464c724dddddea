/// Linear RGB colours for clear and surface colours
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl From<[f32; 3]> for Color {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Color> for [f32; 3] {
    fn from(color: Color) -> Self {
        color.to_array()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("expected colour as R,G,B floats, got {0:?}")]
pub struct ParseColorError(String);

/// Parses `"r,g,b"` with optional whitespace around each component.
impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseColorError(s.to_string()))?;

        match components.as_slice() {
            [r, g, b] => Ok(Self::new(*r, *g, *b)),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("0.2,0.3,0.3".parse::<Color>(), Ok(Color::new(0.2, 0.3, 0.3)));
        assert_eq!(" 1 , 0.5,0.2 ".parse::<Color>(), Ok(Color::new(1.0, 0.5, 0.2)));
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!("1,2".parse::<Color>().is_err());
        assert!("1,2,3,4".parse::<Color>().is_err());
        assert!("red".parse::<Color>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let color = Color::new(0.25, 0.5, 1.0);
        assert_eq!(color.to_string().parse::<Color>(), Ok(color));
    }

    #[test]
    fn test_array_conversion() {
        let arr: [f32; 3] = Color::new(0.1, 0.2, 0.3).into();
        assert_eq!(arr, [0.1, 0.2, 0.3]);
        assert_eq!(Color::from(arr), Color::new(0.1, 0.2, 0.3));
    }
}
