#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

const NAMED_COLORS: &[(&str, Color)] = &[
    ("white", Color::rgb(1.0, 1.0, 1.0)),
    ("lightgray", Color::rgb(0.75, 0.75, 0.75)),
    ("gray", Color::rgb(0.5, 0.5, 0.5)),
    ("darkgray", Color::rgb(0.25, 0.25, 0.25)),
    ("black", Color::rgb(0.0, 0.0, 0.0)),
    ("clear", Color::rgba(0.0, 0.0, 0.0, 0.0)),
    ("blue", Color::rgb(0.0, 0.0, 1.0)),
    ("navy", Color::rgb(0.0, 0.0, 0.5)),
    ("royal", Color::rgb(0.25, 0.41, 0.88)),
    ("slate", Color::rgb(0.44, 0.5, 0.56)),
    ("sky", Color::rgb(0.53, 0.81, 0.92)),
    ("cyan", Color::rgb(0.0, 1.0, 1.0)),
    ("teal", Color::rgb(0.0, 0.5, 0.5)),
    ("green", Color::rgb(0.0, 1.0, 0.0)),
    ("acid", Color::rgb(0.5, 1.0, 0.0)),
    ("lime", Color::rgb(0.2, 0.8, 0.2)),
    ("forest", Color::rgb(0.13, 0.55, 0.13)),
    ("olive", Color::rgb(0.42, 0.56, 0.14)),
    ("yellow", Color::rgb(1.0, 1.0, 0.0)),
    ("gold", Color::rgb(1.0, 0.84, 0.0)),
    ("goldenrod", Color::rgb(0.85, 0.65, 0.13)),
    ("orange", Color::rgb(1.0, 0.65, 0.0)),
    ("brown", Color::rgb(0.54, 0.27, 0.07)),
    ("tan", Color::rgb(0.82, 0.71, 0.55)),
    ("brick", Color::rgb(0.7, 0.25, 0.25)),
    ("red", Color::rgb(1.0, 0.0, 0.0)),
    ("scarlet", Color::rgb(1.0, 0.2, 0.1)),
    ("crimson", Color::rgb(0.86, 0.08, 0.24)),
    ("coral", Color::rgb(1.0, 0.5, 0.31)),
    ("salmon", Color::rgb(0.98, 0.5, 0.45)),
    ("pink", Color::rgb(1.0, 0.41, 0.71)),
    ("magenta", Color::rgb(1.0, 0.0, 1.0)),
    ("purple", Color::rgb(0.63, 0.13, 0.94)),
    ("violet", Color::rgb(0.93, 0.51, 0.93)),
    ("maroon", Color::rgb(0.69, 0.19, 0.38)),
    ("accent", Color::rgb(1.0, 0.83, 0.45)),
];

pub fn named(name: &str) -> Option<Color> {
    NAMED_COLORS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, color)| *color)
}

pub fn parse_hex(value: &str) -> Option<Color> {
    let digits = value.strip_prefix('#').unwrap_or(value);
    if digits.len() != 6 && digits.len() != 8 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(digits.get(range)?, 16)
            .ok()
            .map(|v| v as f32 / 255.0)
    };
    let r = channel(0..2)?;
    let g = channel(2..4)?;
    let b = channel(4..6)?;
    let a = if digits.len() == 8 { channel(6..8)? } else { 1.0 };
    Some(Color { r, g, b, a })
}

/// Forces the alpha byte of an rgba8888 value to fully opaque.
pub fn opaque(rgba: u32) -> u32 {
    rgba | 0xff
}
