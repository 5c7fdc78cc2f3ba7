//! A name-status diff bucketed by operation code (§4.3: `A/M/D`, with `R`
//! split into an old-path delete and a new-path add).
#[derive(Debug, Clone, Default)]
pub struct DiffBucket {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
}

/// Parses `git diff --name-status -M <base>..<head>` output. Each line is
/// a status code, a tab, then one path (`A`/`M`/`D`) or two paths
/// (`R<similarity>`, old path then new path).
pub fn parse_name_status(output: &str) -> DiffBucket {
    let mut bucket = DiffBucket::default();

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else { continue };
        let Some(first_path) = fields.next() else { continue };

        if let Some(rest) = status.strip_prefix('R') {
            let _similarity = rest;
            if let Some(new_path) = fields.next() {
                bucket.deleted.push(first_path.to_string());
                bucket.added.push(new_path.to_string());
            }
            continue;
        }

        match status {
            "A" => bucket.added.push(first_path.to_string()),
            "M" => bucket.changed.push(first_path.to_string()),
            "D" => bucket.deleted.push(first_path.to_string()),
            _ => {}
        }
    }

    bucket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_has_no_paths() {
        let bucket = DiffBucket::default();
        assert!(bucket.added.is_empty());
        assert!(bucket.changed.is_empty());
        assert!(bucket.deleted.is_empty());
    }

    #[test]
    fn parses_added_modified_and_deleted_entries() {
        let output = "A\tsrc/New.java\nM\tsrc/Existing.java\nD\tsrc/Gone.java\n";
        let bucket = parse_name_status(output);
        assert_eq!(bucket.added, vec!["src/New.java".to_string()]);
        assert_eq!(bucket.changed, vec!["src/Existing.java".to_string()]);
        assert_eq!(bucket.deleted, vec!["src/Gone.java".to_string()]);
    }

    #[test]
    fn splits_a_rename_into_a_delete_and_an_add() {
        let output = "R100\tsrc/Widget.java\tsrc/WidgetView.java\n";
        let bucket = parse_name_status(output);
        assert_eq!(bucket.deleted, vec!["src/Widget.java".to_string()]);
        assert_eq!(bucket.added, vec!["src/WidgetView.java".to_string()]);
    }

    #[test]
    fn ignores_blank_lines() {
        let output = "A\tsrc/New.java\n\n";
        let bucket = parse_name_status(output);
        assert_eq!(bucket.added, vec!["src/New.java".to_string()]);
    }
}
