//! Level text-file loader.
//!
//! A level is a fixed 128x128 grid. Each logical row is encoded as two
//! consecutive text lines:
//!
//! - a glyph row carrying spawn and pickup markers:
//!   `.` empty, `S` player spawn, `E`-`H` enemy spawn (archetype by letter),
//!   `p` pickup;
//! - a height row, offset-encoded per character:
//!   `0`-`9` solid height 0-9, `A`-`J` an elevated platform band at
//!   height 1-10 over solid ground.
//!
//! Malformed input is rejected as a whole; callers keep their previously
//! loaded terrain on failure so a bad file never corrupts a running match.

use crate::components::ShotType;
use crate::terrain::HeightField;
use thiserror::Error;

/// Grid extent of a level file in cells.
pub const LEVEL_SIZE: usize = 128;

/// Errors produced while parsing a level file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("expected {expected} lines, found {found}")]
    WrongLineCount { expected: usize, found: usize },
    #[error("line {line}: expected {expected} characters, found {found}")]
    BadRowLength {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}, column {col}: invalid glyph {ch:?}")]
    BadGlyph { line: usize, col: usize, ch: char },
    #[error("line {line}, column {col}: invalid height code {ch:?}")]
    BadHeightChar { line: usize, col: usize, ch: char },
}

/// An enemy spawn marker read from a glyph row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemySpawn {
    pub x: f32,
    pub z: f32,
    pub primary: ShotType,
    pub secondary: ShotType,
}

/// Everything a parsed level describes.
#[derive(Debug, Clone)]
pub struct LevelData {
    pub field: HeightField,
    pub player_spawns: Vec<(f32, f32)>,
    pub enemy_spawns: Vec<EnemySpawn>,
    pub pickups: Vec<(f32, f32)>,
}

/// Archetype pair granted to an enemy spawned from a marker letter.
fn enemy_archetype(ch: char) -> Option<(ShotType, ShotType)> {
    match ch {
        'E' => Some((ShotType::Standard, ShotType::Standard)),
        'F' => Some((ShotType::Rapid, ShotType::Standard)),
        'G' => Some((ShotType::Heavy, ShotType::Standard)),
        'H' => Some((ShotType::Chain, ShotType::Standard)),
        _ => None,
    }
}

/// Parse a full level file. The whole file is validated before anything is
/// returned, so a failed load leaves no partial state behind.
pub fn parse_level(text: &str) -> Result<LevelData, LevelError> {
    let lines: Vec<&str> = text.lines().collect();
    let expected_lines = LEVEL_SIZE * 2;
    if lines.len() != expected_lines {
        return Err(LevelError::WrongLineCount {
            expected: expected_lines,
            found: lines.len(),
        });
    }

    let mut field = HeightField::new(LEVEL_SIZE, LEVEL_SIZE);
    let mut player_spawns = Vec::new();
    let mut enemy_spawns = Vec::new();
    let mut pickups = Vec::new();

    for row in 0..LEVEL_SIZE {
        let glyph_line_no = row * 2;
        let height_line_no = row * 2 + 1;
        let glyphs: Vec<char> = lines[glyph_line_no].chars().collect();
        let heights: Vec<char> = lines[height_line_no].chars().collect();

        if glyphs.len() != LEVEL_SIZE {
            return Err(LevelError::BadRowLength {
                line: glyph_line_no,
                expected: LEVEL_SIZE,
                found: glyphs.len(),
            });
        }
        if heights.len() != LEVEL_SIZE {
            return Err(LevelError::BadRowLength {
                line: height_line_no,
                expected: LEVEL_SIZE,
                found: heights.len(),
            });
        }

        for col in 0..LEVEL_SIZE {
            // Marker positions are cell centers; units rest on the cell's
            // solid surface, which the caller resolves after the swap.
            let cx = col as f32 + 0.5;
            let cz = row as f32 + 0.5;

            match glyphs[col] {
                '.' => {}
                'S' => player_spawns.push((cx, cz)),
                ch @ 'E'..='H' => {
                    if let Some((primary, secondary)) = enemy_archetype(ch) {
                        enemy_spawns.push(EnemySpawn {
                            x: cx,
                            z: cz,
                            primary,
                            secondary,
                        });
                    }
                }
                'p' => pickups.push((cx, cz)),
                ch => {
                    return Err(LevelError::BadGlyph {
                        line: glyph_line_no,
                        col,
                        ch,
                    })
                }
            }

            match heights[col] {
                ch @ '0'..='9' => {
                    field.set_solid(col, row, ch as i32 - '0' as i32);
                }
                ch @ 'A'..='J' => {
                    field.set_platform(col, row, ch as i32 - 'A' as i32 + 1);
                }
                ch => {
                    return Err(LevelError::BadHeightChar {
                        line: height_line_no,
                        col,
                        ch,
                    })
                }
            }
        }
    }

    Ok(LevelData {
        field,
        player_spawns,
        enemy_spawns,
        pickups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid level text, then let `edit` patch lines.
    fn level_text(edit: impl Fn(&mut Vec<String>)) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(LEVEL_SIZE * 2);
        for _ in 0..LEVEL_SIZE {
            lines.push(".".repeat(LEVEL_SIZE));
            lines.push("0".repeat(LEVEL_SIZE));
        }
        edit(&mut lines);
        lines.join("\n")
    }

    #[test]
    fn test_parse_flat_level() {
        let data = parse_level(&level_text(|_| {})).unwrap();
        assert_eq!(data.field.size_x, LEVEL_SIZE);
        assert!(data.player_spawns.is_empty());
        assert!(data.enemy_spawns.is_empty());
    }

    #[test]
    fn test_parse_markers_and_heights() {
        let text = level_text(|lines| {
            let mut glyphs: Vec<char> = lines[0].chars().collect();
            glyphs[3] = 'S';
            glyphs[10] = 'F';
            glyphs[20] = 'p';
            lines[0] = glyphs.into_iter().collect();

            let mut heights: Vec<char> = lines[1].chars().collect();
            heights[5] = '7';
            heights[6] = 'C'; // platform at height 3
            lines[1] = heights.into_iter().collect();
        });
        let data = parse_level(&text).unwrap();

        assert_eq!(data.player_spawns, vec![(3.5, 0.5)]);
        assert_eq!(data.enemy_spawns.len(), 1);
        assert_eq!(data.enemy_spawns[0].primary, ShotType::Rapid);
        assert_eq!(data.pickups, vec![(20.5, 0.5)]);
        assert_eq!(data.field.height(5.5, 0.5), 7);
        assert_eq!(data.field.platform_height(6.5, 0.5), 3);
    }

    #[test]
    fn test_wrong_line_count_rejected() {
        let err = parse_level("...\n000\n").unwrap_err();
        assert_eq!(
            err,
            LevelError::WrongLineCount {
                expected: LEVEL_SIZE * 2,
                found: 2
            }
        );
    }

    #[test]
    fn test_short_row_rejected() {
        let text = level_text(|lines| lines[4] = ".".repeat(LEVEL_SIZE - 1));
        let err = parse_level(&text).unwrap_err();
        assert!(matches!(err, LevelError::BadRowLength { line: 4, .. }));
    }

    #[test]
    fn test_bad_height_char_rejected() {
        let text = level_text(|lines| {
            let mut heights: Vec<char> = lines[7].chars().collect();
            heights[2] = 'z';
            lines[7] = heights.into_iter().collect();
        });
        let err = parse_level(&text).unwrap_err();
        assert!(matches!(
            err,
            LevelError::BadHeightChar {
                line: 7,
                col: 2,
                ch: 'z'
            }
        ));
    }

    #[test]
    fn test_bad_glyph_rejected() {
        let text = level_text(|lines| {
            let mut glyphs: Vec<char> = lines[2].chars().collect();
            glyphs[0] = '?';
            lines[2] = glyphs.into_iter().collect();
        });
        assert!(matches!(
            parse_level(&text),
            Err(LevelError::BadGlyph { line: 2, col: 0, .. })
        ));
    }
}
