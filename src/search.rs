use crate::photo::Photo;

/// Photos with at least one user whose name starts with `prefix` (case-sensitive).
///
/// An empty prefix keeps every photo, including ones without users.
pub fn filter_by_user_prefix<'a>(photos: &'a [Photo], prefix: &str) -> Vec<&'a Photo> {
    if prefix.is_empty() {
        return photos.iter().collect();
    }

    photos
        .iter()
        .filter(|photo| photo.has_user_with_prefix(prefix))
        .collect()
}
