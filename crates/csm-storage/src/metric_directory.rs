//! 메트릭 디렉토리.
//!
//! 노출 ID 하나당 레코드 파일 하나. 별도 인덱스 없이 디렉토리 나열만으로
//! 저장된 메트릭을 찾는다.
//!
//! 파일명 규칙: `[a-z0-9_-]`로만 된 ID는 그대로, 그 외는 `~` + 소문자 hex 인코딩.
//! 대소문자를 구분하지 않는 파일시스템에서도 ID마다 파일명이 겹치지 않는다.
//! 파일명과 ID는 일대일이며, 규칙대로 만들어지지 않은 파일명은 무시한다.
//! 확장자는 `.csm`, 쓰기 중인 임시 파일은 `.csm.tmp`.

use csm_core::error::CoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 메트릭 레코드 확장자
pub const METRIC_FILE_EXTENSION: &str = "csm";

/// 쓰기 중 임시 파일 확장자 (레코드 확장자 뒤에 붙음)
pub const TEMP_FILE_EXTENSION: &str = "tmp";

/// hex 인코딩된 파일명 접두사
const ENCODED_PREFIX: char = '~';

/// 메트릭 레코드 디렉토리
#[derive(Debug, Clone)]
pub struct MetricDirectory {
    dir: PathBuf,
}

impl MetricDirectory {
    /// 디렉토리를 열고(없으면 생성) 중단된 쓰기의 임시 파일을 정리한다
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CoreError::Config(format!("메트릭 디렉토리 생성 실패: {}: {e}", dir.display()))
        })?;

        let directory = Self { dir };
        let removed = directory.remove_stale_temp_files();
        info!(
            "메트릭 디렉토리 초기화: {} (임시 파일 {removed}개 정리)",
            directory.dir.display()
        );
        Ok(directory)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// 노출 ID의 레코드 경로 (결정적)
    pub fn metric_file_path(&self, impression_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{METRIC_FILE_EXTENSION}",
            encode_file_stem(impression_id)
        ))
    }

    /// 레코드 경로에서 노출 ID 복원
    pub fn impression_id_of(path: &Path) -> Option<String> {
        if path.extension()? != METRIC_FILE_EXTENSION {
            return None;
        }
        decode_file_stem(path.file_stem()?.to_str()?)
    }

    /// 저장된 레코드 파일 목록. 임시 파일과 알 수 없는 파일은 제외
    pub fn list_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("메트릭 디렉토리 나열 실패: {}: {e}", self.dir.display());
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::impression_id_of(path).is_some())
            .collect()
    }

    /// `*.csm.tmp` 임시 파일 삭제. 삭제한 개수 반환
    fn remove_stale_temp_files(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
            if !is_temp_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("임시 파일 삭제 실패: {}: {e}", path.display()),
            }
        }
        removed
    }
}

/// 레코드 경로에 대응하는 임시 파일 경로
pub fn temp_path_for(record_path: &Path) -> PathBuf {
    record_path.with_extension(format!("{METRIC_FILE_EXTENSION}.{TEMP_FILE_EXTENSION}"))
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMP_FILE_EXTENSION)
        && path
            .file_stem()
            .and_then(|stem| Path::new(stem).extension())
            .is_some_and(|ext| ext == METRIC_FILE_EXTENSION)
}

fn is_plain_id(impression_id: &str) -> bool {
    !impression_id.is_empty()
        && impression_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn encode_file_stem(impression_id: &str) -> String {
    if is_plain_id(impression_id) {
        impression_id.to_string()
    } else {
        format!("{ENCODED_PREFIX}{}", hex::encode(impression_id.as_bytes()))
    }
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let impression_id = match stem.strip_prefix(ENCODED_PREFIX) {
        Some(encoded) => {
            let bytes = hex::decode(encoded).ok()?;
            String::from_utf8(bytes).ok()?
        }
        None => stem.to_string(),
    };
    (encode_file_stem(&impression_id) == stem).then_some(impression_id)
}
