use std::io::{Cursor, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{ReadBytesExt, LE};
use rescomp_core::compile::build;
use rescomp_core::{
    format, load_string_pool, AttributeValue, AxmlReader, CompileOptions, Event, NoIncluded,
    Pseudolocalize, ResourceIds, ANDROID_NS_URI,
};

const LAYOUT_WIDTH: u32 = 0x010100f4;
const TEXT: u32 = 0x0101014f;
const ID: u32 = 0x010100d0;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rescomp-build-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(root: &Path, file: &str, contents: &str) {
    let path = root.join(file);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn framework() -> Box<ResourceIds> {
    let mut ids = ResourceIds::new("android");
    ids.insert_attr(
        "layout_width",
        LAYOUT_WIDTH,
        format::DIMENSION | format::ENUM,
        &[("match_parent", 0xffffffff), ("wrap_content", 0xfffffffe)],
    )
    .insert_attr("text", TEXT, format::STRING | format::REFERENCE, &[])
    .insert_attr("id", ID, format::REFERENCE, &[]);
    Box::new(ids)
}

fn project(name: &str) -> PathBuf {
    let dir = scratch_dir(name);
    let res = dir.join("res");
    write(
        &res,
        "values/strings.xml",
        r#"<resources>
            <string name="hello">Hello</string>
            <string name="plain" translatable="false">Plain</string>
        </resources>"#,
    );
    write(
        &res,
        "values-fr/strings.xml",
        r#"<resources><string name="hello">Bonjour</string></resources>"#,
    );
    write(
        &res,
        "layout/main.xml",
        r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
                xmlns:tools="http://schemas.android.com/tools"
                android:layout_width="match_parent"
                tools:context=".Main">
            <!-- The title -->
            <TextView android:id="@+id/title" android:text="@string/hello" />
        </LinearLayout>"#,
    );
    write(&res, "drawable/icon.png", "not really a png");
    res
}

fn table_strings(arsc: &[u8]) -> Vec<String> {
    let mut cursor = Cursor::new(arsc);
    assert_eq!(cursor.read_u16::<LE>().unwrap(), 0x0002);
    assert_eq!(cursor.read_u16::<LE>().unwrap(), 12);
    assert_eq!(cursor.read_u32::<LE>().unwrap() as usize, arsc.len());
    assert_eq!(cursor.read_u32::<LE>().unwrap(), 1);

    assert_eq!(cursor.read_u16::<LE>().unwrap(), 0x0001);
    cursor.seek(SeekFrom::Start(20)).unwrap();
    load_string_pool(&mut cursor).unwrap().strings
}

#[test]
fn builds_a_small_app() {
    let res = project("app");
    let options = CompileOptions::new("com.example.app");
    let output = build(&[res.clone()], &[], &options, framework()).unwrap();

    let strings = table_strings(&output.arsc);
    for expected in ["Hello", "Bonjour", "Plain", "res/drawable/icon.png", "res/layout/main.xml"] {
        assert!(strings.iter().any(|s| s == expected), "{expected} missing from {strings:?}");
    }

    let layout = &output.xml_files["res/layout/main.xml"];
    let mut cursor = Cursor::new(layout.as_slice());
    let mut reader = AxmlReader::new(&mut cursor).unwrap();
    assert_eq!(reader.resource_map(), &[LAYOUT_WIDTH, ID, TEXT]);

    let mut elements = Vec::new();
    while let Some(event) = reader.read_next_event().unwrap() {
        if let Event::StartElement {
            name,
            attributes,
            comment,
            special,
            ..
        } = event
        {
            elements.push((name, attributes, comment, special));
        }
    }
    assert_eq!(elements.len(), 2);

    let (name, attributes, _, _) = &elements[0];
    assert_eq!(name, "LinearLayout");
    // The tools attribute is not compiled
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].resource_id, Some(LAYOUT_WIDTH));
    assert_eq!(attributes[0].value, AttributeValue::Integer(-1));

    let (name, attributes, comment, special) = &elements[1];
    assert_eq!(name, "TextView");
    assert_eq!(comment.as_deref(), Some(" The title "));
    assert_eq!(special.id, 1);
    let id = &attributes[0];
    assert_eq!(id.namespace.as_deref(), Some(ANDROID_NS_URI));
    assert_eq!(id.name, "id");
    assert!(matches!(id.value, AttributeValue::Reference(r) if r >> 24 == 0x7f));
    let text = &attributes[1];
    assert_eq!(text.resource_id, Some(TEXT));
    assert!(matches!(text.value, AttributeValue::Reference(r) if r >> 24 == 0x7f));

    let _ = std::fs::remove_dir_all(res.parent().unwrap());
}

#[test]
fn overlays_replace_values() {
    let res = project("overlay");
    let overlay = res.parent().unwrap().join("overlay");
    write(
        &overlay,
        "values/strings.xml",
        r#"<resources><string name="hello">Howdy</string></resources>"#,
    );

    let options = CompileOptions::new("com.example.app");
    let output = build(&[res.clone()], &[overlay], &options, framework()).unwrap();
    let strings = table_strings(&output.arsc);
    assert!(strings.iter().any(|s| s == "Howdy"));
    assert!(!strings.iter().any(|s| s == "Hello"));

    let _ = std::fs::remove_dir_all(res.parent().unwrap());
}

#[test]
fn errors_from_every_file_are_reported() {
    let dir = scratch_dir("errors");
    let res = dir.join("res");
    write(
        &res,
        "values/a.xml",
        r#"<resources><string name="one">%s and %d</string></resources>"#,
    );
    write(
        &res,
        "values/b.xml",
        r#"<resources><item type="integer" name="two" format="nope">1</item><item name="three" /></resources>"#,
    );

    let options = CompileOptions::new("com.example.app");
    let err = build(&[res], &[], &options, Box::new(NoIncluded))
        .err()
        .unwrap()
        .to_string();
    assert!(err.contains("Compiling resource tables failed with 2 error(s)"), "{err}");
    assert!(err.contains("'format' attribute value \"nope\" not valid"));
    assert!(err.contains("a.xml"));
    assert!(err.contains("A 'type' attribute is required for <item>"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn file_resources_need_valid_names() {
    let dir = scratch_dir("names");
    let res = dir.join("res");
    write(&res, "drawable/2-icon.png", "not really a png");
    write(&res, "drawable/icon.png", "not really a png");

    let options = CompileOptions::new("com.example.app");
    let err = build(&[res], &[], &options, Box::new(NoIncluded))
        .err()
        .unwrap()
        .to_string();
    assert!(err.contains("failed with 1 error(s)"), "{err}");
    assert!(err.contains("Invalid file name '2-icon'"), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn pseudolocales_are_generated() {
    let res = project("pseudo");
    let mut options = CompileOptions::new("com.example.app");
    options.pseudolocalize = Pseudolocalize::Accented;
    let output = build(&[res.clone()], &[], &options, framework()).unwrap();

    let strings = table_strings(&output.arsc);
    assert!(strings.iter().any(|s| s.starts_with("[Ĥéļļö")), "{strings:?}");
    assert!(!strings.iter().any(|s| s.starts_with("[Þļåîñ")));

    let _ = std::fs::remove_dir_all(res.parent().unwrap());
}
