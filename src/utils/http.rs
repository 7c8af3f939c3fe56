use crate::error::FetchError;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Build the HTTP client used for every page request (library defaults only)
pub fn build_client() -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder().build()?)
}

/// Stream the body of `url` into `target`, returning the number of bytes written.
///
/// Only `200 OK` counts as success. The body is written to a `.part` sibling
/// first and renamed into place once complete, so a failure never leaves a
/// file under the final name.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> Result<u64, FetchError> {
    let mut response = client.get(url).send().await?;

    if response.status() != StatusCode::OK {
        return Err(FetchError::Status {
            status: response.status(),
        });
    }

    let part = part_path(target);
    let result = write_body(&mut response, &part).await;
    let written = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Err(source) = tokio::fs::rename(&part, target).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(FetchError::Io {
            path: target.to_path_buf(),
            source,
        });
    }

    Ok(written)
}

async fn write_body(response: &mut reqwest::Response, part: &Path) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: part.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

pub fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/out/sn1_seq-1.jp2")),
            PathBuf::from("/out/sn1_seq-1.jp2.part")
        );
    }
}
