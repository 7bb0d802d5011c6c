//! Character records as received from the remote catalogue and as cached
//! locally.

use chrono::{DateTime, Utc};

/// Life status of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Alive,
    Dead,
    Unknown,
}

impl Status {
    /// Wire and database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "ALIVE",
            Self::Dead => "DEAD",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse the wire and database representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ALIVE" => Some(Self::Alive),
            "DEAD" => Some(Self::Dead),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Alive => "Alive",
            Self::Dead => "Dead",
            Self::Unknown => "Unknown",
        }
    }
}

/// Species category of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Human,
    Alien,
    MythologicalCreature,
    Robot,
    Animal,
}

impl Species {
    /// Wire and database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "HUMAN",
            Self::Alien => "ALIEN",
            Self::MythologicalCreature => "MYTHOLOGICAL_CREATURE",
            Self::Robot => "ROBOT",
            Self::Animal => "ANIMAL",
        }
    }

    /// Parse the wire and database representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HUMAN" => Some(Self::Human),
            "ALIEN" => Some(Self::Alien),
            "MYTHOLOGICAL_CREATURE" => Some(Self::MythologicalCreature),
            "ROBOT" => Some(Self::Robot),
            "ANIMAL" => Some(Self::Animal),
            _ => None,
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Alien => "Alien",
            Self::MythologicalCreature => "Mythological creature",
            Self::Robot => "Robot",
            Self::Animal => "Animal",
        }
    }
}

/// A character as listed by the remote catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub status: Status,
    pub species: Species,
}

/// A character row in the local cache.
///
/// `file_path` always points at the deterministic live image location for
/// `id`, whether or not the file exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCharacter {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub updated_at: DateTime<Utc>,
    pub status: Status,
    pub species: Species,
    /// True while a fresh image is being fetched for this id.
    pub is_loading: bool,
}

impl CachedCharacter {
    /// Build the cache row for a freshly synced remote character.
    pub fn from_remote(character: &Character, file_path: String) -> Self {
        Self {
            id: character.id.clone(),
            name: character.name.clone(),
            file_path,
            updated_at: Utc::now(),
            status: character.status,
            species: character.species,
            is_loading: false,
        }
    }
}

/// Strip characters that are invalid in file names on common platforms.
pub fn clean_id(id: &str) -> String {
    id.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Whether `id` can name its own file inside the image directories.
///
/// Ids that would lose characters to [`clean_id`] are refused so two ids
/// never share one image file.
pub fn is_usable_id(id: &str) -> bool {
    !id.trim().is_empty() && id != "." && id != ".." && clean_id(id) == id
}

/// Deterministic image file name for a character id.
pub fn image_file_name(id: &str) -> String {
    format!("{}.jpg", clean_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [Status::Alive, Status::Dead, Status::Unknown] {
            assert_eq!(Status::from_str(status.as_str()), Some(status));
        }
        assert_eq!(Status::from_str("alive"), None);
    }

    #[test]
    fn test_species_round_trip() {
        for species in [
            Species::Human,
            Species::Alien,
            Species::MythologicalCreature,
            Species::Robot,
            Species::Animal,
        ] {
            assert_eq!(Species::from_str(species.as_str()), Some(species));
        }
        assert_eq!(Species::from_str("DRAGON"), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Status::Unknown.label(), "Unknown");
        assert_eq!(Species::MythologicalCreature.label(), "Mythological creature");
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name("a"), "a.jpg");
        assert_eq!(image_file_name("x/y:z"), "xyz.jpg");
    }

    #[test]
    fn test_is_usable_id() {
        assert!(is_usable_id("8f14e45f-ceea-467a-9af2-2b1b7bd1f1a9"));
        assert!(!is_usable_id(""));
        assert!(!is_usable_id("///"));
        assert!(!is_usable_id(".."));
        assert!(!is_usable_id("   "));
        assert!(!is_usable_id("a:b"));
        assert!(!is_usable_id("dir/a"));
    }

    #[test]
    fn test_usable_ids_get_distinct_file_names() {
        let ids = ["ab", "a:b", "a b", "AB"];
        let usable: Vec<&str> = ids.iter().copied().filter(|id| is_usable_id(id)).collect();
        assert_eq!(usable, vec!["ab", "a b", "AB"]);

        let names: std::collections::HashSet<String> =
            usable.iter().map(|id| image_file_name(id)).collect();
        assert_eq!(names.len(), usable.len());
    }

    #[test]
    fn test_from_remote_clears_loading() {
        let character = Character {
            id: "a".to_string(),
            name: "Rick".to_string(),
            image_url: "http://x/a.jpg".to_string(),
            status: Status::Alive,
            species: Species::Human,
        };
        let cached = CachedCharacter::from_remote(&character, "/data/images2/a.jpg".to_string());
        assert_eq!(cached.id, "a");
        assert_eq!(cached.file_path, "/data/images2/a.jpg");
        assert!(!cached.is_loading);
    }
}
