//! 图片排序服务
//!
//! ## 职责
//!
//! 按指定策略对输入图片列表计算一个确定的排列：
//! - 纯函数：不修改输入，任何单个条目的取键失败都只影响该条目
//!   （时间戳取 0、大小取 0），整体排序永不失败
//! - 稳定排序：键相同的条目保持原始相对顺序
//!
//! 另外提供基于文件名模式的策略推荐（连续编号检测、时间离散度分析）。

use crate::models::{display_name, SortStrategy};
use rand::seq::SliceRandom;
use regex::Regex;
use std::cmp::{Ordering, Reverse};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 文件名中数字段的匹配模式
fn digit_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("数字段正则无效"))
}

/// 自然排序键的分段：数字段按数值比较，文本段按小写字符串比较
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Number(u128),
    Text(String),
}

/// 预计算的自然排序键
#[derive(Debug, Clone)]
struct NaturalKey {
    segments: Vec<Segment>,
    /// 小写完整文件名，混合类型分段比较时的回退依据
    full: String,
}

impl NaturalKey {
    fn new(name: &str) -> Self {
        let full = name.to_lowercase();
        let mut segments = Vec::new();
        let mut last_end = 0;

        for m in digit_run().find_iter(&full) {
            if m.start() > last_end {
                segments.push(Segment::Text(full[last_end..m.start()].to_string()));
            }
            // 超出 u128 的数字段退化为文本段
            match m.as_str().parse::<u128>() {
                Ok(n) => segments.push(Segment::Number(n)),
                Err(_) => segments.push(Segment::Text(m.as_str().to_string())),
            }
            last_end = m.end();
        }
        if last_end < full.len() {
            segments.push(Segment::Text(full[last_end..].to_string()));
        }

        Self { segments, full }
    }

    fn compare(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            let ord = match (a, b) {
                (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
                (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
                // 混合类型：整体回退到完整文件名的字符串比较
                _ => return self.full.cmp(&other.full),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.segments
            .len()
            .cmp(&other.segments.len())
            .then_with(|| self.full.cmp(&other.full))
    }
}

/// 排序策略推荐结果
#[derive(Debug, Clone)]
pub struct SortRecommendation {
    /// 推荐策略
    pub strategy: SortStrategy,
    /// 推荐理由
    pub reason: String,
    /// 文件名中是否含数字
    pub has_numbers: bool,
    /// 是否检测到连续编号
    pub sequential_pattern: bool,
    /// 创建时间最大离散度
    pub time_variance: Duration,
}

/// 图片排序器
#[derive(Debug, Default)]
pub struct ImageSorter;

impl ImageSorter {
    /// 创建排序器
    pub fn new() -> Self {
        Self
    }

    /// 按指定策略排序文件列表
    ///
    /// 返回输入的一个排列，不增不减；键相同时保持原始相对顺序。
    pub fn sort_files(&self, paths: &[PathBuf], strategy: SortStrategy) -> Vec<PathBuf> {
        if paths.is_empty() {
            return Vec::new();
        }

        let mut sorted = paths.to_vec();
        match strategy {
            SortStrategy::Natural => {
                let mut keyed: Vec<(NaturalKey, PathBuf)> = sorted
                    .into_iter()
                    .map(|p| (NaturalKey::new(&display_name(&p)), p))
                    .collect();
                keyed.sort_by(|(a, _), (b, _)| a.compare(b));
                return keyed.into_iter().map(|(_, p)| p).collect();
            }
            SortStrategy::Alphabetical => {
                sorted.sort_by_cached_key(|p| display_name(p).to_lowercase());
            }
            SortStrategy::ReverseAlphabetical => {
                sorted.sort_by_cached_key(|p| Reverse(display_name(p).to_lowercase()));
            }
            SortStrategy::CreationTime => {
                sorted.sort_by_cached_key(|p| creation_time(p));
            }
            SortStrategy::ModificationTime => {
                sorted.sort_by_cached_key(|p| modification_time(p));
            }
            SortStrategy::FileSize => {
                sorted.sort_by_cached_key(|p| file_size(p));
            }
            SortStrategy::FileSizeDesc => {
                sorted.sort_by_cached_key(|p| Reverse(file_size(p)));
            }
            SortStrategy::Random => {
                sorted.shuffle(&mut rand::thread_rng());
            }
        }
        sorted
    }

    /// 分析文件名模式并推荐排序策略
    pub fn recommend_strategy(&self, paths: &[PathBuf]) -> SortRecommendation {
        if paths.is_empty() {
            return SortRecommendation {
                strategy: SortStrategy::Natural,
                reason: "没有可分析的文件".to_string(),
                has_numbers: false,
                sequential_pattern: false,
                time_variance: Duration::ZERO,
            };
        }

        let basenames: Vec<String> = paths.iter().map(|p| display_name(p)).collect();
        let has_numbers = basenames.iter().any(|n| digit_run().is_match(n));
        let sequential_pattern = detect_sequential_pattern(&basenames);
        let time_variance = time_variance(paths);

        let (strategy, reason) = if sequential_pattern {
            (SortStrategy::Natural, "检测到文件名中的连续编号".to_string())
        } else if has_numbers {
            (SortStrategy::Natural, "文件名中包含数字".to_string())
        } else if time_variance > Duration::from_secs(3600) {
            (
                SortStrategy::CreationTime,
                "文件创建时间离散度较大".to_string(),
            )
        } else {
            (SortStrategy::Alphabetical, "使用标准字母排序".to_string())
        };

        SortRecommendation {
            strategy,
            reason,
            has_numbers,
            sequential_pattern,
            time_variance,
        }
    }
}

/// 获取文件创建时间，不可用时退回修改时间，再不可用按 UNIX 纪元处理
fn creation_time(path: &Path) -> SystemTime {
    match std::fs::metadata(path) {
        Ok(meta) => meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(UNIX_EPOCH),
        Err(_) => UNIX_EPOCH,
    }
}

/// 获取文件修改时间，不可用时按 UNIX 纪元处理
fn modification_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(UNIX_EPOCH)
}

/// 获取文件大小，不可用时按 0 处理
fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// 检测文件名尾部数字是否构成近似等差的编号序列
fn detect_sequential_pattern(basenames: &[String]) -> bool {
    let mut numbers: Vec<u128> = Vec::new();
    for name in basenames {
        // 取最右侧的数字作为候选编号
        if let Some(m) = digit_run().find_iter(name).last() {
            if let Ok(n) = m.as_str().parse::<u128>() {
                numbers.push(n);
            }
        }
    }

    if numbers.len() < 3 {
        return false;
    }

    numbers.sort_unstable();
    let mut differences: Vec<u128> = numbers.windows(2).map(|w| w[1] - w[0]).collect();
    differences.sort_unstable();
    differences.dedup();
    differences.len() <= 2
}

/// 文件创建时间的最大离散度
fn time_variance(paths: &[PathBuf]) -> Duration {
    let times: Vec<SystemTime> = paths
        .iter()
        .map(|p| creation_time(p))
        .filter(|t| *t > UNIX_EPOCH)
        .collect();

    match (times.iter().min(), times.iter().max()) {
        (Some(min), Some(max)) => max.duration_since(*min).unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_natural_sort_orders_numbers_numerically() {
        let sorter = ImageSorter::new();
        let sorted = sorter.sort_files(&paths(&["a2.png", "a10.png", "a1.png"]), SortStrategy::Natural);
        assert_eq!(sorted, paths(&["a1.png", "a2.png", "a10.png"]));
    }

    #[test]
    fn test_natural_sort_with_padded_numbers() {
        let sorter = ImageSorter::new();
        let sorted = sorter.sort_files(
            &paths(&["image-010.png", "image-002.png", "image-001.png"]),
            SortStrategy::Natural,
        );
        assert_eq!(
            sorted,
            paths(&["image-001.png", "image-002.png", "image-010.png"])
        );
    }

    #[test]
    fn test_natural_sort_mixed_segments_fall_back_to_string_order() {
        let sorter = ImageSorter::new();
        // "1.png" 的首段是数字，"a.png" 的首段是文本，整体回退字符串比较
        let sorted = sorter.sort_files(&paths(&["a.png", "1.png"]), SortStrategy::Natural);
        assert_eq!(sorted, paths(&["1.png", "a.png"]));
    }

    #[test]
    fn test_alphabetical_is_case_insensitive() {
        let sorter = ImageSorter::new();
        let sorted = sorter.sort_files(&paths(&["B.png", "a.png"]), SortStrategy::Alphabetical);
        assert_eq!(sorted, paths(&["a.png", "B.png"]));
    }

    #[test]
    fn test_reverse_alphabetical() {
        let sorter = ImageSorter::new();
        let sorted = sorter.sort_files(
            &paths(&["a.png", "c.png", "b.png"]),
            SortStrategy::ReverseAlphabetical,
        );
        assert_eq!(sorted, paths(&["c.png", "b.png", "a.png"]));
    }

    #[test]
    fn test_every_strategy_returns_a_permutation() {
        let sorter = ImageSorter::new();
        let input = paths(&["b2.png", "a10.jpg", "c.bmp", "a2.jpg", "missing.png"]);
        for strategy in SortStrategy::all() {
            let sorted = sorter.sort_files(&input, *strategy);
            assert_eq!(sorted.len(), input.len(), "策略 {} 改变了数量", strategy.name());
            let mut a = sorted.clone();
            let mut b = input.clone();
            a.sort();
            b.sort();
            assert_eq!(a, b, "策略 {} 丢失或新增了条目", strategy.name());
        }
    }

    #[test]
    fn test_missing_files_sort_as_oldest_and_smallest() {
        // 不存在的文件时间戳按 0 处理，应排在最前
        let sorter = ImageSorter::new();
        let dir = std::env::temp_dir().join(format!("ocr_sorter_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("创建临时目录失败");
        let real = dir.join("real.png");
        std::fs::write(&real, b"0123456789").expect("写入失败");

        let missing = dir.join("missing.png");
        let input = vec![real.clone(), missing.clone()];

        let by_mtime = sorter.sort_files(&input, SortStrategy::ModificationTime);
        assert_eq!(by_mtime[0], missing);

        let by_size = sorter.sort_files(&input, SortStrategy::FileSize);
        assert_eq!(by_size[0], missing);

        let by_size_desc = sorter.sort_files(&input, SortStrategy::FileSizeDesc);
        assert_eq!(by_size_desc[0], real);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stable_ties_keep_original_order() {
        let sorter = ImageSorter::new();
        // 两个不存在的文件大小均为 0，稳定排序应保持输入顺序
        let input = paths(&["z_first.png", "a_second.png"]);
        let sorted = sorter.sort_files(&input, SortStrategy::FileSize);
        assert_eq!(sorted, input);
    }

    #[test]
    fn test_empty_input() {
        let sorter = ImageSorter::new();
        assert!(sorter.sort_files(&[], SortStrategy::Natural).is_empty());
    }

    #[test]
    fn test_strategy_registry_round_trip() {
        for strategy in SortStrategy::all() {
            assert_eq!(SortStrategy::from_name(strategy.name()), Some(*strategy));
            assert!(!strategy.description().is_empty());
        }
        assert_eq!(SortStrategy::from_name("no_such_strategy"), None);
    }

    #[test]
    fn test_recommend_sequential_numbering() {
        let sorter = ImageSorter::new();
        let rec = sorter.recommend_strategy(&paths(&["p1.png", "p2.png", "p3.png", "p4.png"]));
        assert!(rec.sequential_pattern);
        assert_eq!(rec.strategy, SortStrategy::Natural);
    }

    #[test]
    fn test_recommend_alphabetical_without_numbers() {
        let sorter = ImageSorter::new();
        let rec = sorter.recommend_strategy(&paths(&["cover.png", "back.png"]));
        assert!(!rec.has_numbers);
        assert_eq!(rec.strategy, SortStrategy::Alphabetical);
    }
}
