use feedguard_core::{AuditEntry, PageContract, PostRecord};
use std::sync::{Mutex, MutexGuard};

/// Session log of hidden posts.
#[derive(Debug)]
pub struct AuditLog {
    contract: PageContract,
    snippet_chars: usize,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new(contract: &PageContract, snippet_chars: usize) -> Self {
        Self {
            contract: contract.clone(),
            snippet_chars,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, post: &PostRecord, triggered: Vec<(String, f64)>) -> AuditEntry {
        let entry = AuditEntry {
            post_id: post.id.clone(),
            permalink_url: self.contract.permalink(&post.id),
            text_snippet: snippet(&post.text, self.snippet_chars),
            triggered,
        };
        self.lock().push(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    pub fn hidden_count(&self) -> usize {
        self.lock().len()
    }

    /// Entries in display form, separated by blank lines.
    pub fn render(&self) -> String {
        self.lock()
            .iter()
            .map(|entry| entry.to_string())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
