use anyhow::Context;
use std::path::Path;

/// Copies the collected data directory into a built web bundle
/// (`<bundle>/data`). Both the source directory and the bundle root must
/// already exist. Returns the number of files copied.
pub fn publish_data(src: &Path, bundle_root: &Path) -> anyhow::Result<usize> {
    anyhow::ensure!(
        src.is_dir(),
        "data directory does not exist: {} (run the fetch first)",
        src.display()
    );
    anyhow::ensure!(
        bundle_root.is_dir(),
        "bundle directory does not exist: {} (build the web bundle first)",
        bundle_root.display()
    );

    let dest = bundle_root.join("data");
    let copied = copy_recursive(src, &dest)?;
    tracing::info!(
        src = %src.display(),
        dest = %dest.display(),
        files = copied,
        "published data directory"
    );
    Ok(copied)
}

fn copy_recursive(src: &Path, dest: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let mut copied = 0;
    for entry in
        std::fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))?
    {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).with_context(|| {
                format!("failed to copy {} to {}", from.display(), to.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
