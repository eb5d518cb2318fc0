use ratatui::style::Color;

use crate::instance::Rgb;

/// Map a setting color to something the current terminal can show. With
/// truecolor (`COLORTERM` contains `truecolor` or `24bit`) the value passes
/// through, otherwise the nearest xterm-256 index is used.
pub fn terminal_color(rgb: Rgb) -> Color {
    if truecolor() {
        Color::Rgb(rgb.0, rgb.1, rgb.2)
    } else {
        Color::Indexed(xterm_index(rgb))
    }
}

fn truecolor() -> bool {
    std::env::var("COLORTERM").is_ok_and(|var| {
        let var = var.to_lowercase();
        var.contains("truecolor") || var.contains("24bit")
    })
}

fn xterm_index(Rgb(r, g, b): Rgb) -> u8 {
    // 6x6x6 cube occupies 16..=231, gray ramp 232..=255
    let (r6, g6, b6) = (to_cube(r), to_cube(g), to_cube(b));
    let cube = 16 + 36 * r6 + 6 * g6 + b6;
    let cube_dist = distance_sq((r, g, b), (CUBE[r6 as usize], CUBE[g6 as usize], CUBE[b6 as usize]));

    let avg = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
    let gray = ((u16::from(avg) * 23 + 127) / 255) as u8;
    let level = (8 + u16::from(gray) * 10).min(255) as u8;
    let gray_dist = distance_sq((r, g, b), (level, level, level));

    if gray_dist < cube_dist { 232 + gray } else { cube }
}

const CUBE: [u8; 6] = [0, 95, 135, 175, 215, 255];

fn to_cube(v: u8) -> u8 {
    ((u16::from(v) * 5 + 127) / 255) as u8
}

fn distance_sq(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let d = |x: u8, y: u8| (i32::from(x) - i32::from(y)).pow(2) as u32;
    d(a.0, b.0) + d(a.1, b.1) + d(a.2, b.2)
}
