use std::time::Duration;

use autosign::config::DeviceSection;
use autosign::device::adb::{escape_input_text, parse_wm_size};
use autosign::device::hierarchy::{HierarchyParser, unescape};
use autosign::device::{AdbDevice, Rect, ScreenSize};
use autosign::locate::Selector;

const DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.example.bbs" content-desc="" clickable="false" bounds="[0,0][1080,2400]">
    <node index="0" text="Sign In" resource-id="com.example.bbs:id/btn_sign" class="android.widget.Button" package="com.example.bbs" content-desc="签到 &amp; 领奖" clickable="true" bounds="[100,200][300,260]" />
    <node index="1" text="&quot;Tom&quot; &lt;3 &#26085;&#x672C;" resource-id="" class="android.widget.TextView" package="com.example.bbs" content-desc="" clickable="false" bounds="[0,300][1080,360]" />
  </node>
</hierarchy>"#;

#[test]
fn hierarchy_dump_parses_in_document_order() {
    let parser = HierarchyParser::new().unwrap();
    let elements = parser.parse(DUMP);

    assert_eq!(elements.len(), 3);

    let root = &elements[0];
    assert_eq!(root.class, "android.widget.FrameLayout");
    assert_eq!(root.bounds, Rect::new(0, 0, 1080, 2400));
    assert!(!root.clickable);

    let button = &elements[1];
    assert_eq!(button.text, "Sign In");
    assert_eq!(button.desc, "签到 & 领奖");
    assert_eq!(button.id, "com.example.bbs:id/btn_sign");
    assert!(button.clickable);
    assert_eq!(button.bounds, Rect::new(100, 200, 300, 260));

    assert_eq!(elements[2].text, "\"Tom\" <3 日本");
}

#[test]
fn parsed_elements_work_with_selectors() {
    let parser = HierarchyParser::new().unwrap();
    let elements = parser.parse(DUMP);

    let sel = Selector::parse(r#"id("btn_sign") && clickable(true)"#).unwrap();
    let hits: Vec<_> = elements.iter().filter(|e| sel.matches(e)).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Sign In");

    let card = Selector::desc_contains("领奖");
    assert!(card.matches(&elements[1]));
}

#[test]
fn bounds_parsing() {
    let parser = HierarchyParser::new().unwrap();
    assert_eq!(
        parser.parse_bounds("[0,84][1080,2274]"),
        Some(Rect::new(0, 84, 1080, 2274))
    );
    assert_eq!(
        parser.parse_bounds(" [-10,0][5,5] "),
        Some(Rect::new(-10, 0, 5, 5))
    );
    assert_eq!(parser.parse_bounds("[0,0][10]"), None);
    assert_eq!(parser.parse_bounds(""), None);

    let els = parser.parse(r#"<node text="x" bounds="garbage" />"#);
    assert_eq!(els[0].bounds, Rect::default());
}

#[test]
fn unescape_entities() {
    assert_eq!(unescape("plain"), "plain");
    assert_eq!(unescape("a &amp; b"), "a & b");
    assert_eq!(unescape("&apos;x&apos;&gt;"), "'x'>");
    assert_eq!(unescape("&#65;&#x42;"), "AB");
    assert_eq!(unescape("&nbsp; stays"), "&nbsp; stays");
    assert_eq!(unescape("dangling &amp"), "dangling &amp");
}

#[test]
fn wm_size_prefers_override() {
    assert_eq!(
        parse_wm_size("Physical size: 1080x2400\n"),
        Some(ScreenSize {
            width: 1080,
            height: 2400
        })
    );
    assert_eq!(
        parse_wm_size("Physical size: 1440x3200\nOverride size: 1080x2400\n"),
        Some(ScreenSize {
            width: 1080,
            height: 2400
        })
    );
    assert_eq!(parse_wm_size("error: no devices"), None);
}

#[test]
fn input_text_is_shell_escaped() {
    assert_eq!(escape_input_text("hello"), "hello");
    assert_eq!(escape_input_text("a b"), "a%sb");
    assert_eq!(escape_input_text("it's (ok)"), r"it\'s%s\(ok\)");
    assert_eq!(escape_input_text("$HOME&x"), r"\$HOME\&x");
    assert_eq!(escape_input_text("50%"), "50%");
}

#[test]
fn foreground_package_from_dumpsys() {
    let device = AdbDevice::new(&DeviceSection::default(), Duration::from_millis(100)).unwrap();

    let current = "  mCurrentFocus=Window{1a2b3c u0 com.example.bbs/com.example.bbs.MainActivity}\n";
    assert_eq!(device.parse_focus(current).as_deref(), Some("com.example.bbs"));

    let app = "mFocusedApp=ActivityRecord{9f u0 org.autojs.autojs6/.ui.main.MainActivity t42}";
    assert_eq!(device.parse_focus(app).as_deref(), Some("org.autojs.autojs6"));

    assert_eq!(device.parse_focus("  mCurrentFocus=null\n"), None);
}
