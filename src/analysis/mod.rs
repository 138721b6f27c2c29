/// Numerical stages: grouped statistics and the variable-importance path.
///
/// ```text
///   RawTable ─▶ preprocess ─▶ outliers ─▶ decomposition ─▶ rotation ─▶ importance
///       │
///       └────▶ grouped   (mean / stdev per timepoint × condition)
/// ```
pub mod decomposition;
pub mod grouped;
pub mod importance;
pub mod outliers;
pub mod preprocess;
pub mod rotation;
