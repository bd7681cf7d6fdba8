//! Block command builders.
//!
//! Everything a generator sends is one of two shapes:
//!
//! ```text
//! fill x1 y1 z1 x2 y2 z2 <block> replace
//! setblock x y z <block>[state]{nbt} replace
//! ```

use guildcraft_domain::BlockPos;

/// Largest volume the server accepts in a single `fill`.
pub const MAX_FILL_VOLUME: i64 = 32_768;

/// Characters that fit on one line of a sign.
pub const SIGN_LINE_WIDTH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    North,
    South,
    East,
    West,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::North => "north",
            Facing::South => "south",
            Facing::East => "east",
            Facing::West => "west",
        }
    }
}

/// Fill the box spanned by two corners, split into as many commands as the
/// volume limit requires.
pub fn fill(a: BlockPos, b: BlockPos, block: &str) -> Vec<String> {
    let min = BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z));
    let max = BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z));
    let mut commands = Vec::new();
    split_fill(min, max, block, &mut commands);
    commands
}

/// Halve along the longest axis until every piece is within the limit.
fn split_fill(min: BlockPos, max: BlockPos, block: &str, out: &mut Vec<String>) {
    let dx = i64::from(max.x - min.x) + 1;
    let dy = i64::from(max.y - min.y) + 1;
    let dz = i64::from(max.z - min.z) + 1;
    if dx * dy * dz <= MAX_FILL_VOLUME {
        out.push(format!(
            "fill {} {} {} {} {} {} {block} replace",
            min.x, min.y, min.z, max.x, max.y, max.z
        ));
        return;
    }

    if dx >= dy && dx >= dz {
        let mid = min.x + ((max.x - min.x) / 2);
        split_fill(min, BlockPos::new(mid, max.y, max.z), block, out);
        split_fill(BlockPos::new(mid + 1, min.y, min.z), max, block, out);
    } else if dy >= dz {
        let mid = min.y + ((max.y - min.y) / 2);
        split_fill(min, BlockPos::new(max.x, mid, max.z), block, out);
        split_fill(BlockPos::new(min.x, mid + 1, min.z), max, block, out);
    } else {
        let mid = min.z + ((max.z - min.z) / 2);
        split_fill(min, BlockPos::new(max.x, max.y, mid), block, out);
        split_fill(BlockPos::new(min.x, min.y, mid + 1), max, block, out);
    }
}

pub fn setblock(at: BlockPos, block: &str) -> String {
    format!("setblock {} {} {} {block} replace", at.x, at.y, at.z)
}

/// Wall sign at `at`, attached to the block on the side opposite `facing`.
pub fn wall_sign(at: BlockPos, facing: Facing, lines: &[String; 4]) -> String {
    let messages = lines
        .iter()
        .map(|line| snbt_text(line))
        .collect::<Vec<_>>()
        .join(",");
    setblock(
        at,
        &format!(
            "oak_wall_sign[facing={}]{{front_text:{{messages:[{messages}]}}}}",
            facing.as_str()
        ),
    )
}

/// A JSON text component wrapped as a single-quoted SNBT string.
fn snbt_text(line: &str) -> String {
    let json = serde_json::json!({ "text": line }).to_string();
    format!("'{}'", json.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Lay a title and optional body out over the four sign lines.
///
/// The title takes the first line; the body wraps over the next two; the
/// footer goes on the last line. Everything is cut to the line width.
pub fn sign_lines(title: &str, body: Option<&str>, footer: &str) -> [String; 4] {
    let mut wrapped = wrap(body.unwrap_or_default(), SIGN_LINE_WIDTH).into_iter();
    [
        clip(title),
        wrapped.next().unwrap_or_default(),
        wrapped.next().unwrap_or_default(),
        clip(footer),
    ]
}

fn clip(text: &str) -> String {
    text.trim().chars().take(SIGN_LINE_WIDTH).collect()
}

/// Greedy word wrap; words longer than a line are hard-split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(command: &str) -> i64 {
        let parts: Vec<i64> = command
            .split_whitespace()
            .skip(1)
            .take(6)
            .map(|p| p.parse().expect("coordinate"))
            .collect();
        (parts[3] - parts[0] + 1) * (parts[4] - parts[1] + 1) * (parts[5] - parts[2] + 1)
    }

    #[test]
    fn small_fills_are_a_single_command() {
        let commands = fill(BlockPos::new(5, 64, 5), BlockPos::new(-5, 60, -5), "stone");
        assert_eq!(commands, vec!["fill -5 60 -5 5 64 5 stone replace".to_string()]);
    }

    #[test]
    fn large_fills_are_decomposed_without_loss() {
        let a = BlockPos::new(0, 0, 0);
        let b = BlockPos::new(99, 9, 99);
        let commands = fill(a, b, "air");

        assert!(commands.len() > 1);
        assert!(commands.iter().all(|c| volume(c) <= MAX_FILL_VOLUME));
        let total: i64 = commands.iter().map(|c| volume(c)).sum();
        assert_eq!(total, 100 * 10 * 100);
    }

    #[test]
    fn a_fill_exactly_at_the_limit_stays_whole() {
        let commands = fill(BlockPos::new(0, 0, 0), BlockPos::new(31, 31, 31), "air");
        assert_eq!(commands.len(), 1);
        assert_eq!(volume(&commands[0]), MAX_FILL_VOLUME);
    }

    #[test]
    fn sign_text_is_escaped_for_snbt_and_json() {
        let lines = sign_lines(r#"it's "quoted""#, Some(r"back\slash"), "#3");
        let command = wall_sign(BlockPos::new(1, 65, 2), Facing::South, &lines);

        assert!(command.starts_with("setblock 1 65 2 oak_wall_sign[facing=south]{front_text:{messages:["));
        assert!(command.contains(r#"'{"text":"it\'s \\"quoted\\""}'"#));
        assert!(command.contains(r#"'{"text":"back\\\\slash"}'"#));
        assert!(command.ends_with("]}} replace"));
    }

    #[test]
    fn sign_lines_wrap_and_clip() {
        let lines = sign_lines(
            "a-very-long-channel-name",
            Some("talk about anything you like here"),
            "#12",
        );
        assert_eq!(lines[0], "a-very-long-cha");
        assert_eq!(lines[1], "talk about");
        assert_eq!(lines[2], "anything you");
        assert_eq!(lines[3], "#12");
        assert!(lines.iter().all(|l| l.chars().count() <= SIGN_LINE_WIDTH));

        let bare = sign_lines("general", None, "");
        assert_eq!(bare[1], "");
        assert_eq!(bare[2], "");
    }
}
