// Sparse header helpers. dstat names a family once in the outer header row and leaves the
// cells of its remaining sub-metrics empty; readers that label such cells call them "Unnamed".

const PLACEHOLDER_PREFIX: &str = "Unnamed";

pub fn is_placeholder(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.starts_with(PLACEHOLDER_PREFIX)
}

/// Carry-forward fill: every placeholder takes the last non-placeholder label to its left.
/// Fails with the index of a placeholder that has no label before it.
pub fn fill_sparse_header(labels: &mut [String]) -> Result<(), usize> {
    let mut current: Option<String> = None;
    for (idx, label) in labels.iter_mut().enumerate() {
        if is_placeholder(label) {
            match &current {
                Some(value) => *label = value.clone(),
                None => return Err(idx),
            }
        } else {
            let trimmed = label.trim().to_string();
            *label = trimmed.clone();
            current = Some(trimmed);
        }
    }
    Ok(())
}
