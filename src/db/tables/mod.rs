//! Database table operations

pub mod library_table;
pub mod track_table;

pub use library_table::{LibraryQuery, LibrarySort, LibraryTable, SortOrder};
pub use track_table::{
    derive_identity, CatalogueIds, CatalogueMatch, DerivedIdentity, TrackOptions, TrackTable,
};
