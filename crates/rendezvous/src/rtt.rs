use std::io;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only sink for round-trip-time samples, one sample per line.
#[derive(Debug)]
pub struct RttSink {
    file: Mutex<File>,
}

impl RttSink {
    /// Open (or create) the sink file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append `sample` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or flush fails.
    pub async fn append(&self, sample: &str) -> io::Result<()> {
        let mut line = String::with_capacity(sample.len() + 1);
        line.push_str(sample);
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn appends_one_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtt.dat");
        std::fs::write(&path, "earlier\n").unwrap();

        let sink = RttSink::open(&path).await.unwrap();
        sink.append("{\"rtt\":12}").await.unwrap();
        sink.append("{\"rtt\":15}").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier\n{\"rtt\":12}\n{\"rtt\":15}\n");
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtt.dat");
        let sink = Arc::new(RttSink::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                sink.append(&format!("sample-{i:02}-{}", "x".repeat(512)))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 16);
        assert!(lines.iter().all(|l| l.starts_with("sample-") && l.len() == 522));
    }
}
