//! Story file parsing (§4.D): a `---`-delimited YAML front-matter block
//! followed by a UTF-8 markdown body. Grounded on the Go original's
//! `pkg/architect/queue.go` front-matter surface (bracketed `depends_on`
//! lists and bare scalars, not full YAML) and, for the split itself, on
//! the teacher's own `spec::parser::SpecParser` (`src/spec/parser.rs`),
//! which reaches for `gray_matter` to strip `---`-delimited front matter
//! from a markdown body and re-parses the raw YAML block with `serde_yaml`.

use crate::error::{Error, Result};
use crate::queue::story::QueuedStory;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FrontMatter {
    id: String,
    title: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    est_points: u32,
}

/// Parse one story file's contents into a [`QueuedStory`].
pub fn parse_story(contents: &str) -> Result<QueuedStory> {
    let matter = Matter::<YAML>::new();
    let parsed = matter.parse(contents);

    if parsed.data.is_none() {
        return Err(Error::Parse(
            "story file must begin with a `---` front-matter delimiter".into(),
        ));
    }

    let front_matter = extract_front_matter_yaml(contents).ok_or_else(|| {
        Error::Parse("story file front matter is missing its closing `---`".into())
    })?;
    let parsed_front_matter: FrontMatter = serde_yaml::from_str(front_matter)?;

    if parsed_front_matter.id.trim().is_empty() {
        return Err(Error::Parse("story is missing an id".into()));
    }
    if parsed_front_matter.title.trim().is_empty() {
        return Err(Error::Parse("story is missing a title".into()));
    }

    Ok(QueuedStory::new(
        parsed_front_matter.id,
        parsed_front_matter.title,
        parsed_front_matter.depends_on,
        parsed_front_matter.est_points,
        parsed.content,
    ))
}

/// `gray_matter`'s `Pod` data isn't a direct `serde::Deserialize` target for
/// an arbitrary struct, so (mirroring `SpecParser::parse_content`) the raw
/// YAML block between the two `---` delimiters is re-extracted and handed
/// to `serde_yaml` directly.
fn extract_front_matter_yaml(contents: &str) -> Option<&str> {
    let after_open = contents.strip_prefix("---\n")?;
    let close = after_open.find("\n---")?;
    Some(&after_open[..close])
}

/// Parse every `*.md` file directly under `dir` into a story. A malformed
/// file's error is attached to its path rather than aborting the whole
/// directory scan.
pub fn parse_stories_dir(dir: &Path) -> Result<Vec<QueuedStory>> {
    let mut stories = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let contents = std::fs::read_to_string(&path)?;
        let story = parse_story(&contents).map_err(|e| {
            Error::Parse(format!("{}: {e}", path.display()))
        })?;
        stories.push(story);
    }
    Ok(stories)
}
