use anyhow::Result;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Moves backwards in a file to beginning of a previous line.
/// The byte right before the current position is treated as the terminator of the line we are
/// leaving, so repeated calls walk the file one line at a time.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    // We skip first new line that is right before the buffer, so that reading doesn't get stuck.
    // For example: need_to_read_this\nwe_are_here_now\n
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let iter = buffer[..next_chunk].iter().rev().enumerate();
        let iter = iter.skip(need_to_skip);
        for (index, value) in iter {
            if *value == b'\n' {
                file.seek(std::io::SeekFrom::Current(-(index as i64)))
                    .await?;
                return Ok(());
            }
        }

        need_to_skip = need_to_skip.saturating_sub(1);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

/// Reads a file line by line starting from the last line. Yearly logs are appended to, so this
/// yields the most recently written records first.
pub struct ReverseLines<F> {
    file: F,
    buffer: Vec<u8>,
    position: u64,
}

impl<F: AsyncSeek + AsyncRead + Unpin> ReverseLines<F> {
    pub async fn new(mut file: F) -> Result<Self> {
        let position = file.seek(std::io::SeekFrom::End(0)).await?;
        Ok(Self {
            file,
            buffer: vec![0; 4096],
            position,
        })
    }

    /// Returns the previous line without its terminator, `None` once the start is reached.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.position == 0 {
            return Ok(None);
        }

        self.file
            .seek(std::io::SeekFrom::Start(self.position))
            .await?;
        seek_line_backwards(&mut self.file, &mut self.buffer).await?;
        let start = self.file.stream_position().await?;

        let mut raw = vec![0; (self.position - start) as usize];
        self.file.read_exact(&mut raw).await?;
        self.position = start;

        let mut line = String::from_utf8_lossy(&raw).into_owned();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;

    use tempfile::tempfile;
    use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

    use crate::fs::operations::{seek_line_backwards, ReverseLines};

    #[tokio::test]
    async fn test_seek_line_backwards_basic() -> Result<()> {
        let mut file = tempfile()?;
        let b = "2024-01-01, 00:30, ++, \"+proj\"\n\
                 2024-01-02, 00:45, ++, \"+proj\"\n\
                 2024-01-03, 01:00, (), \"write report\"";

        file.write_all(b.as_bytes())?;

        let mut file = tokio::fs::File::from_std(file);
        file.seek(std::io::SeekFrom::End(0)).await?;

        for _ in 0..3 {
            seek_line_backwards(&mut file, vec![0; 1024].as_mut_slice()).await?;
        }

        assert_eq!(file.stream_position().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_seek_line_backwards_empty() -> Result<()> {
        let file = tempfile()?;
        let file = tokio::fs::File::from_std(file);

        let mut file = BufReader::new(file);
        let mut value = String::new();
        file.read_line(&mut value).await?;

        seek_line_backwards(&mut file, vec![0; 1024].as_mut_slice()).await?;

        assert_eq!(file.stream_position().await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_seek_line_backwards_small_buffer() -> Result<()> {
        let mut file = tempfile()?;
        let b = "first line\n\
                 second line\n\
                 third";

        let positions = b
            .bytes()
            .enumerate()
            .filter(|v| v.1 == b'\n')
            .map(|v| v.0 + 1)
            .collect::<Vec<_>>();

        file.write_all(b.as_bytes())?;

        let mut file = BufReader::new(tokio::fs::File::from_std(file));

        file.seek(std::io::SeekFrom::Start(0)).await?;

        {
            file.read_line(&mut String::new()).await?;
            file.read_line(&mut String::new()).await?;
            file.read_line(&mut String::new()).await?;

            seek_line_backwards(&mut file, vec![0; 2].as_mut_slice()).await?;

            assert_eq!(file.stream_position().await?, positions[1] as u64);

            seek_line_backwards(&mut file, vec![0; 2].as_mut_slice()).await?;

            assert_eq!(file.stream_position().await?, positions[0] as u64);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_reverse_lines_walks_from_the_end() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all("a\nb\n\nc\n".as_bytes())?;

        let mut lines = ReverseLines::new(tokio::fs::File::from_std(file)).await?;
        let mut collected = vec![];
        while let Some(line) = lines.next_line().await? {
            collected.push(line);
        }

        assert_eq!(collected, vec!["c", "", "b", "a"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reverse_lines_without_trailing_newline() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all("first\nsecond".as_bytes())?;

        let mut lines = ReverseLines::new(tokio::fs::File::from_std(file)).await?;

        assert_eq!(lines.next_line().await?.as_deref(), Some("second"));
        assert_eq!(lines.next_line().await?.as_deref(), Some("first"));
        assert_eq!(lines.next_line().await?, None);
        Ok(())
    }
}
