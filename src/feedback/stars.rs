//! Star rating embedded in the generated summary text.
//!
//! The generator writes its rating as glyphs, e.g. `★★★½☆`. There is no
//! structured field, so a summary that drifts from this convention simply
//! rates as zero.

const FILLED: char = '★';
const HALF: char = '½';
const EMPTY: char = '☆';
const MAX_STARS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StarRating {
    pub full: u8,
    pub half: bool,
}

impl StarRating {
    /// Finds the first run of filled stars, optionally followed by one half
    /// marker, that is immediately followed by an empty star or the end of
    /// the text.
    pub fn parse(summary: &str) -> Self {
        let chars: Vec<char> = summary.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != FILLED {
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && chars[i] == FILLED {
                i += 1;
            }
            let full = i - start;
            let half = chars.get(i) == Some(&HALF);
            let next = if half { i + 1 } else { i };

            if matches!(chars.get(next), None | Some(&EMPTY)) {
                return Self::clamped(full, half);
            }
        }

        Self::default()
    }

    fn clamped(full: usize, half: bool) -> Self {
        if full >= MAX_STARS {
            Self {
                full: MAX_STARS as u8,
                half: false,
            }
        } else {
            Self {
                full: full as u8,
                half,
            }
        }
    }

    pub fn value(&self) -> f32 {
        self.full as f32 + if self.half { 0.5 } else { 0.0 }
    }

    /// Number of glyphs in the matched run, counting the half marker as one.
    pub fn glyph_len(&self) -> u8 {
        self.full + u8::from(self.half)
    }
}
