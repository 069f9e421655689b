use std::collections::BTreeSet;
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;

/// Remembers which pool indices a player has already been served. Storage is
/// best-effort: implementations log and swallow their own I/O failures.
pub trait SeenQuestionsStorage: Send + Sync + Debug {
    fn seen_question_ids(&self) -> Vec<usize>;

    /// Merges `ids` into the stored set.
    fn add_seen_question_ids(&mut self, ids: &[usize]);

    fn clear_seen_questions(&mut self);
}

#[derive(Debug, Default)]
pub struct InMemorySeenQuestions {
    ids: BTreeSet<usize>,
}

impl InMemorySeenQuestions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenQuestionsStorage for InMemorySeenQuestions {
    fn seen_question_ids(&self) -> Vec<usize> {
        self.ids.iter().copied().collect()
    }

    fn add_seen_question_ids(&mut self, ids: &[usize]) {
        self.ids.extend(ids.iter().copied());
    }

    fn clear_seen_questions(&mut self) {
        self.ids.clear();
    }
}

/// Seen-set persisted as a JSON array of indices, one file per player.
///
/// All I/O here is blocking `std::fs` on a file of a few hundred bytes, run
/// inline on the calling task. Session actors call it at most twice per
/// `start`.
#[derive(Debug)]
pub struct JsonFileSeenQuestions {
    path: PathBuf,
}

impl JsonFileSeenQuestions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_ids(&self) -> BTreeSet<usize> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(e) => {
                tracing::warn!(
                    file.path = %self.path.display(),
                    error = %e,
                    "Failed to read seen questions, treating as empty"
                );
                return BTreeSet::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(
                file.path = %self.path.display(),
                error = %e,
                "Seen questions file is corrupt, treating as empty"
            );
            BTreeSet::new()
        })
    }

    fn write_ids(&self, ids: &BTreeSet<usize>) {
        let serialized = match serde_json::to_string(ids) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize seen questions");
                return;
            }
        };

        if let Some(parent) = self.path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            tracing::warn!(
                dir.path = %parent.display(),
                error = %e,
                "Failed to create seen questions directory"
            );
            return;
        }

        if let Err(e) = fs::write(&self.path, serialized) {
            tracing::warn!(
                file.path = %self.path.display(),
                error = %e,
                "Failed to store seen questions"
            );
        }
    }
}

impl SeenQuestionsStorage for JsonFileSeenQuestions {
    fn seen_question_ids(&self) -> Vec<usize> {
        self.read_ids().into_iter().collect()
    }

    fn add_seen_question_ids(&mut self, ids: &[usize]) {
        let mut stored = self.read_ids();
        stored.extend(ids.iter().copied());
        self.write_ids(&stored);
    }

    fn clear_seen_questions(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                file.path = %self.path.display(),
                error = %e,
                "Failed to clear seen questions"
            ),
        }
    }
}
