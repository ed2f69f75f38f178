//! Aggregated user list over the loaded photos.
//!
//! The index keeps a copy of each tracked photo's user names and rebuilds the
//! `(name, photo_count)` list on every mutation. Subscribers receive one
//! [`UsersChanged`] snapshot per mutation, so a batch add of a whole folder
//! produces a single event.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::photo::Photo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSortType {
    /// Discovery order.
    #[default]
    None,
    Alphabetical,
    /// Ascending photo count, ties in discovery order.
    ByCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub photo_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Added { photos: usize },
    Removed,
    Reset,
    SortChanged,
}

/// Snapshot delivered to subscribers after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersChanged {
    pub reason: ChangeReason,
    pub sort_type: UserSortType,
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone)]
struct TrackedPhoto {
    path: PathBuf,
    users: Vec<String>,
}

#[derive(Debug, Default)]
pub struct UserIndex {
    photos: Vec<TrackedPhoto>,
    sort_type: UserSortType,
    sorted_users: Vec<UserEntry>,
    subscribers: Vec<mpsc::Sender<UsersChanged>>,
}

impl UserIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_type(&self) -> UserSortType {
        self.sort_type
    }

    pub fn sorted_users(&self) -> &[UserEntry] {
        &self.sorted_users
    }

    /// Number of distinct users.
    pub fn len(&self) -> usize {
        self.sorted_users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_users.is_empty()
    }

    /// Number of tracked photos.
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    /// Receive a snapshot after every mutation. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::Receiver<UsersChanged> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn add(&mut self, photo: &Photo) {
        self.add_batch(std::iter::once(photo));
    }

    /// Track several photos at once; subscribers hear about the batch once.
    pub fn add_batch<'a, I>(&mut self, photos: I)
    where
        I: IntoIterator<Item = &'a Photo>,
    {
        let before = self.photos.len();
        self.photos.extend(photos.into_iter().map(|photo| TrackedPhoto {
            path: photo.path.clone(),
            users: photo.user_names().map(str::to_string).collect(),
        }));

        let added = self.photos.len() - before;
        if added > 0 {
            self.rebuild(ChangeReason::Added { photos: added });
        }
    }

    /// Stop tracking the photo at `path`. Returns false if it was not tracked.
    pub fn remove(&mut self, path: &Path) -> bool {
        match self.photos.iter().position(|p| p.path == path) {
            Some(index) => {
                self.photos.remove(index);
                self.rebuild(ChangeReason::Removed);
                true
            }
            None => false,
        }
    }

    /// Drop every tracked photo. The sort mode is kept.
    pub fn reset(&mut self) {
        self.photos.clear();
        self.rebuild(ChangeReason::Reset);
    }

    pub fn set_sort_type(&mut self, sort_type: UserSortType) {
        if self.sort_type == sort_type {
            return;
        }
        self.sort_type = sort_type;
        self.rebuild(ChangeReason::SortChanged);
    }

    fn rebuild(&mut self, reason: ChangeReason) {
        self.sorted_users = aggregate(&self.photos, self.sort_type);
        tracing::debug!(
            ?reason,
            sort_type = ?self.sort_type,
            users = self.sorted_users.len(),
            photos = self.photos.len(),
            "User index rebuilt"
        );
        self.notify(reason);
    }

    fn notify(&mut self, reason: ChangeReason) {
        if self.subscribers.is_empty() {
            return;
        }

        let event = UsersChanged {
            reason,
            sort_type: self.sort_type,
            users: self.sorted_users.clone(),
        };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn aggregate(photos: &[TrackedPhoto], sort_type: UserSortType) -> Vec<UserEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut users: Vec<UserEntry> = Vec::new();

    for name in photos.iter().flat_map(|p| p.users.iter()) {
        match positions.get(name.as_str()) {
            Some(&index) => users[index].photo_count += 1,
            None => {
                positions.insert(name.as_str(), users.len());
                users.push(UserEntry {
                    name: name.clone(),
                    photo_count: 1,
                });
            }
        }
    }

    match sort_type {
        UserSortType::None => {}
        UserSortType::Alphabetical => users.sort_by(|a, b| a.name.cmp(&b.name)),
        // Stable, so equal counts stay in discovery order
        UserSortType::ByCount => users.sort_by_key(|u| u.photo_count),
    }

    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VrcMetadata;

    fn photo(name: &str, users: &[&str]) -> Photo {
        Photo::new(
            format!("/shots/{}.png", name),
            Some(VrcMetadata::with_users(users.iter().copied())),
        )
    }

    /// One distinct user per photo, added out of order: d, a, e, b, c.
    fn photos_for_alphabet() -> Vec<Photo> {
        [3u8, 0, 4, 1, 2]
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let name = ((b'a' + offset) as char).to_string();
                photo(&format!("alpha{}", i), &[name.as_str()])
            })
            .collect()
    }

    /// Photo i carries user `(a + n)` repeated n times, for n in 3, 5, 1, 4, 2.
    fn photos_for_count() -> Vec<Photo> {
        [3usize, 5, 1, 4, 2]
            .iter()
            .map(|&n| {
                let name = ((b'a' + n as u8) as char).to_string();
                let users = vec![name.as_str(); n];
                photo(&format!("count{}", n), &users)
            })
            .collect()
    }

    fn total_users(photos: &[Photo]) -> usize {
        photos.iter().map(|p| p.user_names().count()).sum()
    }

    #[test]
    fn test_default_sort_type_is_none() {
        assert_eq!(UserIndex::new().sort_type(), UserSortType::None);
    }

    #[test]
    fn test_five_distinct_users() {
        let photos: Vec<Photo> = (0..5u8)
            .map(|i| {
                let name = ((b'a' + i) as char).to_string();
                photo(&name, &[name.as_str()])
            })
            .collect();

        let mut index = UserIndex::new();
        index.add_batch(&photos);

        assert_eq!(index.len(), 5);
        assert!(index.sorted_users().iter().all(|u| u.photo_count == 1));
    }

    #[test]
    fn test_two_distinct_users_per_photo() {
        let photos: Vec<Photo> = (0..5u8)
            .map(|i| {
                let first = ((b'a' + i) as char).to_string();
                let second = ((b'z' - i) as char).to_string();
                photo(&first, &[first.as_str(), second.as_str()])
            })
            .collect();

        let mut index = UserIndex::new();
        index.add_batch(&photos);
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn test_same_user_twice_per_photo() {
        let photos: Vec<Photo> = (0..5u8)
            .map(|i| {
                let name = ((b'a' + i) as char).to_string();
                photo(&name, &[name.as_str(), name.as_str()])
            })
            .collect();

        let mut index = UserIndex::new();
        index.add_batch(&photos);

        assert_eq!(index.len(), 5);
        assert!(index.sorted_users().iter().all(|u| u.photo_count == 2));
    }

    #[test]
    fn test_same_two_users_on_every_photo() {
        let photos: Vec<Photo> = (0..5)
            .map(|i| photo(&format!("p{}", i), &["alice", "bob"]))
            .collect();

        let mut index = UserIndex::new();
        index.add_batch(&photos);

        assert_eq!(index.len(), 2);
        assert!(index.sorted_users().iter().all(|u| u.photo_count == 5));
    }

    #[test]
    fn test_growing_user_sets() {
        // Photo i has users a..a+i, so 5 distinct names overall
        let photos: Vec<Photo> = (1..=5u8)
            .map(|i| {
                let names: Vec<String> = (0..i).map(|j| ((b'a' + j) as char).to_string()).collect();
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                photo(&format!("grow{}", i), &refs)
            })
            .collect();

        let mut index = UserIndex::new();
        index.add_batch(&photos);

        assert_eq!(index.len(), 5);
        let counts: Vec<(String, usize)> = index
            .sorted_users()
            .iter()
            .map(|u| (u.name.clone(), u.photo_count))
            .collect();
        assert!(counts.contains(&("a".to_string(), 5)));
        assert!(counts.contains(&("e".to_string(), 1)));
    }

    #[test]
    fn test_counts_sum_to_total_users() {
        let mut photos = photos_for_count();
        photos.extend(photos_for_alphabet());
        photos.push(Photo::new("/shots/empty.png", None));

        let mut index = UserIndex::new();
        index.add_batch(&photos);

        let sum: usize = index.sorted_users().iter().map(|u| u.photo_count).sum();
        assert_eq!(sum, total_users(&photos));
        assert_eq!(index.photo_count(), photos.len());
    }

    #[test]
    fn test_photos_without_users_contribute_nothing() {
        let mut index = UserIndex::new();
        index.add(&Photo::new("/shots/none.png", None));
        index.add(&photo("blank", &[]));

        assert!(index.is_empty());
        assert_eq!(index.photo_count(), 2);
    }

    #[test]
    fn test_alphabetical_order() {
        let mut index = UserIndex::new();
        for p in &photos_for_alphabet() {
            index.add(p);
        }
        let unsorted = index.len();

        index.set_sort_type(UserSortType::Alphabetical);

        assert_eq!(index.len(), unsorted);
        assert_eq!(index.len(), 5);
        for pair in index.sorted_users().windows(2) {
            assert!(pair[0].name <= pair[1].name);
        }
    }

    #[test]
    fn test_count_order() {
        let mut index = UserIndex::new();
        index.add_batch(&photos_for_count());
        let unsorted = index.len();

        index.set_sort_type(UserSortType::ByCount);

        assert_eq!(index.len(), unsorted);
        for pair in index.sorted_users().windows(2) {
            assert!(pair[0].photo_count <= pair[1].photo_count);
        }
        let names: Vec<&str> = index.sorted_users().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_count_ties_keep_discovery_order() {
        let photos = vec![
            photo("p1", &["zoe", "max"]),
            photo("p2", &["amy"]),
            photo("p3", &["max"]),
            photo("p4", &["bob"]),
        ];

        let mut index = UserIndex::new();
        index.set_sort_type(UserSortType::ByCount);
        index.add_batch(&photos);

        let names: Vec<&str> = index.sorted_users().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["zoe", "amy", "bob", "max"]);
    }

    #[test]
    fn test_sort_applies_to_later_additions() {
        let mut index = UserIndex::new();
        index.set_sort_type(UserSortType::Alphabetical);
        index.add(&photo("p1", &["mia"]));
        index.add(&photo("p2", &["ada"]));

        assert_eq!(index.sorted_users()[0].name, "ada");
    }

    #[test]
    fn test_reset_empties_and_keeps_sort_type() {
        let mut index = UserIndex::new();
        index.add_batch(&photos_for_count());
        index.set_sort_type(UserSortType::ByCount);

        index.reset();

        assert_eq!(index.len(), 0);
        assert_eq!(index.photo_count(), 0);
        assert_eq!(index.sort_type(), UserSortType::ByCount);

        index.reset();
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_remove_recomputes_counts() {
        let photos = vec![photo("p1", &["alice", "bob"]), photo("p2", &["alice"])];
        let mut index = UserIndex::new();
        index.add_batch(&photos);

        assert!(index.remove(Path::new("/shots/p1.png")));
        assert_eq!(
            index.sorted_users(),
            &[UserEntry {
                name: "alice".to_string(),
                photo_count: 1
            }]
        );
        assert!(!index.remove(Path::new("/shots/p1.png")));
    }

    #[test]
    fn test_batch_add_notifies_once() {
        let photos = photos_for_count();
        let mut index = UserIndex::new();
        let rx = index.subscribe();

        index.add_batch(&photos);

        let events: Vec<UsersChanged> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, ChangeReason::Added { photos: 5 });
        assert_eq!(events[0].users.len(), 5);
    }

    #[test]
    fn test_notifications_per_mutation() {
        let mut index = UserIndex::new();
        let rx = index.subscribe();

        index.add_batch(std::iter::empty::<&Photo>());
        index.add(&photo("p1", &["alice"]));
        index.set_sort_type(UserSortType::None);
        index.set_sort_type(UserSortType::Alphabetical);
        index.remove(Path::new("/shots/unknown.png"));
        index.remove(Path::new("/shots/p1.png"));
        index.reset();

        let reasons: Vec<ChangeReason> = rx.try_iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ChangeReason::Added { photos: 1 },
                ChangeReason::SortChanged,
                ChangeReason::Removed,
                ChangeReason::Reset,
            ]
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut index = UserIndex::new();
        let rx = index.subscribe();
        let kept = index.subscribe();
        drop(rx);

        index.add(&photo("p1", &["alice"]));
        assert_eq!(index.subscribers.len(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }
}
