use pyo3::prelude::*;

/// Python extension for the search core.
///
/// module-name = "soundshift._core"; the pure Python package wraps this
/// with friendlier constructors.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let search_module = PyModule::new(m.py(), "search")?;
    soundshift_mcts::bindings::register_search_module(&search_module)?;
    m.add_submodule(&search_module)?;
    Ok(())
}
