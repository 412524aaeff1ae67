// In carecheck/src/files.rs

use crate::UploadedFile;

/// Upload-ordered set of files keyed by name.
///
/// Adding a file whose name is already present replaces the earlier entry
/// and moves it to the end, so the collection reads like the order in which
/// the latest versions were uploaded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileCollection {
    files: Vec<UploadedFile>,
}

impl FileCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: UploadedFile) {
        self.files.retain(|existing| existing.name != file.name);
        self.files.push(file);
    }

    pub fn extend(&mut self, files: impl IntoIterator<Item = UploadedFile>) {
        for file in files {
            self.add(file);
        }
    }

    /// Removes the file with the given name, returning it when present.
    pub fn remove(&mut self, name: &str) -> Option<UploadedFile> {
        let index = self.files.iter().position(|file| file.name == name)?;
        Some(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn get(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UploadedFile> {
        self.files.iter()
    }

    pub fn as_slice(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn into_vec(self) -> Vec<UploadedFile> {
        self.files
    }
}

impl FromIterator<UploadedFile> for FileCollection {
    fn from_iter<I: IntoIterator<Item = UploadedFile>>(iter: I) -> Self {
        let mut collection = FileCollection::new();
        collection.extend(iter);
        collection
    }
}

impl<'a> IntoIterator for &'a FileCollection {
    type Item = &'a UploadedFile;
    type IntoIter = std::slice::Iter<'a, UploadedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_adding_a_name_replaces_and_moves_to_end() {
        let mut files = FileCollection::new();
        files.add(UploadedFile::new("a.txt", "one"));
        files.add(UploadedFile::new("b.txt", "two"));
        files.add(UploadedFile::new("a.txt", "three"));

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
        assert_eq!(files.get("a.txt").map(|f| f.content.as_str()), Some("three"));
    }

    #[test]
    fn remove_by_name() {
        let mut files: FileCollection = vec![
            UploadedFile::new("a.txt", "one"),
            UploadedFile::new("b.txt", "two"),
        ]
        .into_iter()
        .collect();

        assert_eq!(files.remove("a.txt").map(|f| f.content), Some("one".to_string()));
        assert!(files.remove("a.txt").is_none());
        assert_eq!(files.len(), 1);

        files.clear();
        assert!(files.is_empty());
    }
}
