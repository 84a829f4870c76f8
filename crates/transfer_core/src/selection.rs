//! Destination selection from the two input channels, last write wins.

use shared::domain::{Location, LocationId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Picked in the hierarchical browse; `path` is the widget's highlighted node path.
    Tree { path: Option<String>, id: LocationId },
    /// Picked from the text search results.
    Search { id: LocationId, name: String },
}

impl Selection {
    pub fn id(&self) -> &LocationId {
        match self {
            Self::Tree { id, .. } | Self::Search { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReconciler {
    selection: Option<Selection>,
    query: String,
    results_open: bool,
}

impl SelectionReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a browse-widget change. Only the most recent non-empty path is kept; an
    /// empty id clears the destination.
    pub fn select_from_tree(&mut self, selected_paths: &[String], id: &str) -> Option<&Selection> {
        self.results_open = false;
        self.selection = LocationId::non_blank(id).map(|id| Selection::Tree {
            path: selected_paths
                .iter()
                .rev()
                .find(|path| !path.trim().is_empty())
                .cloned(),
            id,
        });
        self.selection.as_ref()
    }

    /// Applies a search-result pick: the query shows the picked name and the list closes.
    pub fn pick_search_result(&mut self, location: &Location) -> &Selection {
        self.query = location.display_name.clone();
        self.results_open = false;
        self.selection.insert(Selection::Search {
            id: location.id.clone(),
            name: location.display_name.clone(),
        })
    }

    /// Records typed text; the result list reopens while the operator types.
    pub fn set_query(&mut self, text: &str) {
        self.query = text.to_string();
        self.results_open = true;
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn destination_id(&self) -> Option<&LocationId> {
        self.selection.as_ref().map(Selection::id)
    }

    /// Paths the browse widget should highlight; a search pick highlights nothing.
    pub fn selected_paths(&self) -> Vec<String> {
        match &self.selection {
            Some(Selection::Tree {
                path: Some(path), ..
            }) => vec![path.clone()],
            _ => Vec::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results_open(&self) -> bool {
        self.results_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(id: &str, name: &str) -> Location {
        Location {
            id: LocationId::from(id),
            display_name: name.to_string(),
            path: None,
        }
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn tree_keeps_last_non_empty_path() {
        let mut reconciler = SelectionReconciler::new();
        reconciler.select_from_tree(&paths(&["/ROOT/A", "/ROOT/B", ""]), "B");
        assert_eq!(reconciler.selected_paths(), vec!["/ROOT/B".to_string()]);
        assert_eq!(reconciler.destination_id(), Some(&LocationId::from("B")));
    }

    #[test]
    fn empty_tree_id_clears_destination() {
        let mut reconciler = SelectionReconciler::new();
        reconciler.select_from_tree(&paths(&["/ROOT/A"]), "A");
        reconciler.select_from_tree(&[], "");
        assert!(reconciler.destination_id().is_none());
        assert!(reconciler.selected_paths().is_empty());
    }

    #[test]
    fn search_pick_clears_tree_path_and_fills_query() {
        let mut reconciler = SelectionReconciler::new();
        reconciler.select_from_tree(&paths(&["/ROOT/A"]), "A");
        reconciler.set_query("gul");
        assert!(reconciler.results_open());

        reconciler.pick_search_result(&location("G", "Gulu"));

        assert_eq!(reconciler.destination_id(), Some(&LocationId::from("G")));
        assert!(reconciler.selected_paths().is_empty());
        assert_eq!(reconciler.query(), "Gulu");
        assert!(!reconciler.results_open());
    }

    #[test]
    fn most_recent_channel_wins_in_either_order() {
        let mut reconciler = SelectionReconciler::new();
        reconciler.pick_search_result(&location("G", "Gulu"));
        reconciler.select_from_tree(&paths(&["/ROOT/A"]), "A");
        assert_eq!(
            reconciler.selection(),
            Some(&Selection::Tree {
                path: Some("/ROOT/A".to_string()),
                id: LocationId::from("A"),
            })
        );

        reconciler.pick_search_result(&location("G", "Gulu"));
        assert_eq!(
            reconciler.selection(),
            Some(&Selection::Search {
                id: LocationId::from("G"),
                name: "Gulu".to_string(),
            })
        );
        assert!(reconciler.selected_paths().is_empty());
    }

    #[test]
    fn tree_pick_closes_results_but_keeps_query() {
        let mut reconciler = SelectionReconciler::new();
        reconciler.set_query("kam");
        reconciler.select_from_tree(&paths(&["/ROOT/K"]), "K");
        assert_eq!(reconciler.query(), "kam");
        assert!(!reconciler.results_open());
    }
}
