use std::sync::Arc;

use analysis_core::Rect;
use image::{DynamicImage, GrayImage, Luma};
use ticker_ocr::font::{draw_text, text_width};
use ticker_ocr::{CharacterMatcher, MatcherConfig, TemplateStore, TickerSegmenter};

const PAPER: u8 = 245;
const INK_DARK: u8 = 20;

fn matcher() -> CharacterMatcher {
    CharacterMatcher::new(Arc::new(TemplateStore::builtin().unwrap()), MatcherConfig::default())
}

fn capture(lines: &[(u32, u32, &str)]) -> DynamicImage {
    let mut canvas = GrayImage::from_pixel(640, 320, Luma([PAPER]));
    for &(x, y, text) in lines {
        draw_text(&mut canvas, x, y, text, 6, INK_DARK);
    }
    DynamicImage::ImageLuma8(canvas)
}

fn symbols(image: &DynamicImage, exclusions: &[Rect]) -> Vec<String> {
    TickerSegmenter::default()
        .read_tickers(image, &matcher(), exclusions)
        .into_iter()
        .map(|t| t.symbol)
        .collect()
}

#[test]
fn test_reads_single_ticker() {
    let image = capture(&[(40, 60, "AAPL")]);
    let tickers = TickerSegmenter::default().read_tickers(&image, &matcher(), &[]);

    assert_eq!(tickers.len(), 1);
    let ticker = &tickers[0];
    assert_eq!(ticker.symbol, "AAPL");
    assert_eq!(ticker.confidences.len(), 4);
    assert!(ticker.min_confidence() >= 0.7);
    assert_eq!(ticker.bounds, Rect::new(40, 60, text_width("AAPL", 6), 42));
}

#[test]
fn test_light_text_on_dark_background() {
    let mut canvas = GrayImage::from_pixel(400, 200, Luma([12]));
    draw_text(&mut canvas, 30, 50, "MSFT", 6, 235);
    let image = DynamicImage::ImageLuma8(canvas);
    assert_eq!(symbols(&image, &[]), vec!["MSFT"]);
}

#[test]
fn test_blank_capture_has_no_tickers() {
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([PAPER])));
    assert!(symbols(&image, &[]).is_empty());
}

#[test]
fn test_run_length_window() {
    let image = capture(&[(20, 20, "AB"), (20, 120, "GOOGLE"), (20, 220, "TSLA")]);
    assert_eq!(symbols(&image, &[]), vec!["TSLA"]);
}

#[test]
fn test_digit_only_run_is_not_a_ticker() {
    let image = capture(&[(20, 40, "2024")]);
    assert!(symbols(&image, &[]).is_empty());
}

#[test]
fn test_words_split_on_spaces_and_lines_read_top_to_bottom() {
    let image = capture(&[(20, 200, "NVDA"), (20, 40, "BUY AMD NOW")]);
    assert_eq!(symbols(&image, &[]), vec!["BUY", "AMD", "NOW", "NVDA"]);
}

#[test]
fn test_exclusion_zone_suppresses_text() {
    let image = capture(&[(20, 40, "IBM"), (20, 200, "META")]);
    let zone = Rect::new(0, 180, 640, 100);
    assert_eq!(symbols(&image, &[zone]), vec!["IBM"]);
}

#[test]
fn test_custom_template_directory_round_trip() {
    let dir = std::env::temp_dir().join(format!("ticker-ocr-templates-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let x = ticker_ocr::font::render_glyph('X', 10).unwrap();
    x.save(dir.join("X.png")).unwrap();

    let store = TemplateStore::from_dir(&dir, 30, 40).unwrap();
    assert_eq!(store.len(), 36);
    assert!(store.get('X').is_some());

    let image = capture(&[(40, 60, "XOM")]);
    let matcher = CharacterMatcher::new(Arc::new(store), MatcherConfig::default());
    let tickers = TickerSegmenter::default().read_tickers(&image, &matcher, &[]);
    assert_eq!(tickers.len(), 1);
    assert_eq!(tickers[0].symbol, "XOM");

    std::fs::remove_dir_all(&dir).ok();
}
