/// Data layer: table model, loading, labels and grouping.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ RawTable │  named columns, dynamically-typed cells
///   └──────────┘
///        │                        │
///        ▼                        ▼
///   ┌──────────────────┐    ┌──────────┐
///   │ columns / labels  │    │  pivot   │  metric × task × timepoint
///   └──────────────────┘    └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  groups   │  (timepoint, condition) → row indices
///   └──────────┘
/// ```
pub mod columns;
pub mod groups;
pub mod labels;
pub mod loader;
pub mod model;
pub mod pivot;
