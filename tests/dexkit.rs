mod common;

use std::collections::BTreeMap;

use common::{CodeSpec, DexBuilder};
use dexkit::file::{ACC_PUBLIC, ACC_STATIC};
use dexkit::loader::DexImage;
use dexkit::query::{BatchFindQuery, ClassQuery, FieldQuery, FieldUsageQuery, MethodQuery};
use dexkit::results::{encode_classes, AnnotationValue, Projection};
use dexkit::{DexKit, DexKitError, EncodedId};

// method ids in intern order, see sample_dex
const M_FOO: u32 = 0;
const M_BAR: u32 = 1;
const M_BAZ: u32 = 2;
const M_COMPUTE: u32 = 3;
const F_COUNT: u32 = 0;
const F_NAME: u32 = 1;
const C_FOO: u32 = 0;
const C_BAR: u32 = 2;

/// Two-and-a-half classes worth of app:
///
/// - `Lcom/example/Foo;` implements `Lcom/example/Iface;`, annotated,
///   `foo()V` loads "hello world" and calls `Bar.bar()`
/// - `Lcom/example/FooBar;` is an empty decoy for anchoring tests
/// - `Lcom/example/Bar;` holds a static `count:I` and an instance
///   `name:Ljava/lang/String;`; `bar()V` reads and writes `count` and
///   loads the SMS permission string, `baz()V` loads "OK" and reads
///   `name`, `compute(ILjava/lang/String;)I` carries parameter names and
///   annotations
fn sample_dex() -> Vec<u8> {
    let mut b = DexBuilder::new();

    let s_hello = b.string("hello world");
    let s_sms = b.string("android.permission.SEND_SMS");
    let s_ok = b.string("OK");

    let m_foo = b.method("Lcom/example/Foo;", "foo", "V", &[]);
    let m_bar = b.method("Lcom/example/Bar;", "bar", "V", &[]);
    let m_baz = b.method("Lcom/example/Bar;", "baz", "V", &[]);
    let m_compute = b.method(
        "Lcom/example/Bar;",
        "compute",
        "I",
        &["I", "Ljava/lang/String;"],
    );
    assert_eq!((m_foo, m_bar, m_baz, m_compute), (M_FOO, M_BAR, M_BAZ, M_COMPUTE));

    let f_count = b.field("Lcom/example/Bar;", "count", "I");
    let f_name = b.field("Lcom/example/Bar;", "name", "Ljava/lang/String;");
    assert_eq!((f_count, f_name), (F_COUNT, F_NAME));

    let foo = b.class("Lcom/example/Foo;", Some("Ljava/lang/Object;"), ACC_PUBLIC);
    b.set_source_file(foo, "Foo.java");
    b.add_interface(foo, "Lcom/example/Iface;");
    b.annotate_class(foo, "Lcom/example/Anno;", &[("value", 7)]);
    b.add_method(
        foo,
        m_foo,
        ACC_PUBLIC,
        false,
        Some(CodeSpec::new(
            1,
            vec![
                0x001A, s_hello as u16, // const-string v0
                0x0071, m_bar as u16, 0x0000, // invoke-static {} bar()V
                0x000E, // return-void
            ],
        )),
    );

    b.class("Lcom/example/FooBar;", Some("Ljava/lang/Object;"), ACC_PUBLIC);

    let bar = b.class("Lcom/example/Bar;", Some("Ljava/lang/Object;"), ACC_PUBLIC);
    b.add_field(bar, f_count, ACC_PUBLIC | ACC_STATIC, true);
    b.add_field(bar, f_name, ACC_PUBLIC, false);
    b.annotate_field(bar, f_count, "Lcom/example/Anno;");
    b.add_method(
        bar,
        m_bar,
        ACC_PUBLIC | ACC_STATIC,
        true,
        Some(CodeSpec::new(
            1,
            vec![
                0x0060, f_count as u16, // sget v0
                0x0067, f_count as u16, // sput v0
                0x001A, s_sms as u16, // const-string v0
                0x000E,
            ],
        )),
    );
    b.add_method(
        bar,
        m_baz,
        ACC_PUBLIC,
        false,
        Some(CodeSpec::new(
            2,
            vec![
                0x001A, s_ok as u16, // const-string v0
                0x1054, f_name as u16, // iget-object v0, v1
                0x000E,
            ],
        )),
    );
    b.add_method(
        bar,
        m_compute,
        ACC_PUBLIC,
        false,
        Some(
            CodeSpec::new(3, vec![0x0012, 0x000F]) // const/4 v0; return v0
                .with_param_names(&[Some("x"), Some("s")]),
        ),
    );
    b.annotate_method(bar, m_compute, "Lcom/example/Anno;");
    b.annotate_parameter(bar, m_compute, 2, 0, "Lcom/example/ParamAnno;");

    b.build()
}

fn second_dex() -> Vec<u8> {
    let mut b = DexBuilder::new();
    let s_ok = b.string("OK");
    let m_run = b.method("Lcom/second/Baz;", "run", "V", &[]);
    let baz = b.class("Lcom/second/Baz;", Some("Ljava/lang/Object;"), ACC_PUBLIC);
    b.add_method(
        baz,
        m_run,
        ACC_PUBLIC,
        false,
        Some(CodeSpec::new(1, vec![0x001A, s_ok as u16, 0x000E])),
    );
    b.build()
}

fn session() -> DexKit {
    let _ = env_logger::builder().is_test(true).try_init();
    DexKit::from_bytes(&[sample_dex()]).expect("sample dex should load")
}

fn groups(entries: &[(&str, &[&str])]) -> BatchFindQuery {
    BatchFindQuery {
        groups: entries
            .iter()
            .map(|(name, patterns)| {
                (
                    name.to_string(),
                    patterns.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

#[test]
fn anchored_class_lookup() {
    let kit = session();
    let found = kit
        .batch_find_class_using_strings(&groups(&[
            ("exact", &["^Lcom/example/Foo;$"]),
            ("loose", &["Lcom/example/Foo"]),
        ]))
        .unwrap();

    let exact: Vec<&str> = found["exact"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(exact, vec!["Lcom/example/Foo;"]);

    let loose: Vec<&str> = found["loose"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(loose, vec!["Lcom/example/Foo;", "Lcom/example/FooBar;"]);
}

#[test]
fn multi_string_group_is_conjunctive() {
    let kit = session();
    let found = kit
        .batch_find_class_using_strings(&groups(&[
            ("g1", &["android.permission.SEND_SMS", "OK"]),
            ("g2", &["android.permission.SEND_SMS", "NOT_PRESENT"]),
        ]))
        .unwrap();
    let g1: Vec<&str> = found["g1"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(g1, vec!["Lcom/example/Bar;"]);
    assert!(found["g2"].is_empty());
}

#[test]
fn batch_find_method_scopes_to_single_bodies() {
    let kit = session();
    let found = kit
        .batch_find_method_using_strings(&groups(&[
            ("sms", &["android.permission.SEND_SMS"]),
            ("ok", &["OK"]),
            ("both", &["android.permission.SEND_SMS", "OK"]),
        ]))
        .unwrap();
    assert_eq!(found["sms"].len(), 1);
    assert_eq!(found["sms"][0].name, "bar");
    assert_eq!(found["ok"][0].name, "baz");
    // the two strings live in different methods of Bar
    assert!(found["both"].is_empty());
}

#[test]
fn call_graph_edges() {
    let kit = session();
    let foo = EncodedId::method(0, M_FOO);
    let bar = EncodedId::method(0, M_BAR);

    let callees = kit.get_invoke_methods(foo).unwrap();
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].descriptor(), "Lcom/example/Bar;->bar()V");

    let callers = kit.get_call_methods(bar).unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].descriptor(), "Lcom/example/Foo;->foo()V");

    // leaf methods have no edges
    assert!(kit.get_invoke_methods(bar).unwrap().is_empty());
    assert!(kit.get_call_methods(foo).unwrap().is_empty());
}

#[test]
fn using_strings_per_method() {
    let kit = session();
    assert_eq!(
        kit.get_using_strings(EncodedId::method(0, M_FOO)).unwrap(),
        vec!["hello world"]
    );
    assert_eq!(
        kit.get_using_strings(EncodedId::method(0, M_BAR)).unwrap(),
        vec!["android.permission.SEND_SMS"]
    );
    assert_eq!(
        kit.get_using_strings(EncodedId::method(0, M_BAZ)).unwrap(),
        vec!["OK"]
    );
    assert!(kit
        .get_using_strings(EncodedId::method(0, M_COMPUTE))
        .unwrap()
        .is_empty());
}

#[test]
fn field_access_indexes() {
    let kit = session();
    let count = EncodedId::field(0, F_COUNT);
    let name = EncodedId::field(0, F_NAME);

    let getters = kit.field_get_methods(count).unwrap();
    assert_eq!(getters.len(), 1);
    assert_eq!(getters[0].name, "bar");
    let putters = kit.field_put_methods(count).unwrap();
    assert_eq!(putters.len(), 1);
    assert_eq!(putters[0].name, "bar");

    let name_getters = kit.field_get_methods(name).unwrap();
    assert_eq!(name_getters.len(), 1);
    assert_eq!(name_getters[0].name, "baz");
    assert!(kit.field_put_methods(name).unwrap().is_empty());
}

#[test]
fn using_fields_tagged_by_access() {
    use dexkit::file::FieldAccess;
    let kit = session();
    let usages = kit.get_using_fields(EncodedId::method(0, M_BAR)).unwrap();
    assert_eq!(usages.len(), 2);
    assert!(usages
        .iter()
        .any(|u| u.field.name == "count" && u.access == FieldAccess::Read));
    assert!(usages
        .iter()
        .any(|u| u.field.name == "count" && u.access == FieldAccess::Write));

    let usages = kit.get_using_fields(EncodedId::method(0, M_BAZ)).unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].field.name, "name");
    assert_eq!(usages[0].access, FieldAccess::Read);
}

#[test]
fn op_code_streams() {
    let kit = session();
    assert_eq!(
        kit.get_method_op_codes(EncodedId::method(0, M_FOO)).unwrap(),
        vec![0x1A, 0x71, 0x0E]
    );
    assert_eq!(
        kit.get_method_op_codes(EncodedId::method(0, M_COMPUTE)).unwrap(),
        vec![0x12, 0x0F]
    );
}

#[test]
fn parameter_names_from_debug_info() {
    let kit = session();
    assert_eq!(
        kit.get_parameter_names(EncodedId::method(0, M_COMPUTE)).unwrap(),
        vec![Some("x".to_string()), Some("s".to_string())]
    );
    // foo has no debug info
    assert!(kit
        .get_parameter_names(EncodedId::method(0, M_FOO))
        .unwrap()
        .is_empty());
}

#[test]
fn annotations_roundtrip() {
    let kit = session();

    let class_annotations = kit.get_class_annotations(EncodedId::class(0, C_FOO)).unwrap();
    assert_eq!(class_annotations.len(), 1);
    assert_eq!(class_annotations[0].type_descriptor, "Lcom/example/Anno;");
    assert_eq!(class_annotations[0].elements.len(), 1);
    assert_eq!(class_annotations[0].elements[0].name, "value");
    assert_eq!(class_annotations[0].elements[0].value, AnnotationValue::Int(7));

    let method_annotations = kit
        .get_method_annotations(EncodedId::method(0, M_COMPUTE))
        .unwrap();
    assert_eq!(method_annotations.len(), 1);
    assert_eq!(method_annotations[0].type_descriptor, "Lcom/example/Anno;");

    let field_annotations = kit
        .get_field_annotations(EncodedId::field(0, F_COUNT))
        .unwrap();
    assert_eq!(field_annotations.len(), 1);

    let parameter_annotations = kit
        .get_parameter_annotations(EncodedId::method(0, M_COMPUTE))
        .unwrap();
    assert_eq!(parameter_annotations.len(), 2);
    assert_eq!(parameter_annotations[0].len(), 1);
    assert_eq!(
        parameter_annotations[0][0].type_descriptor,
        "Lcom/example/ParamAnno;"
    );
    assert!(parameter_annotations[1].is_empty());

    // methods without annotations yield nothing
    assert!(kit
        .get_method_annotations(EncodedId::method(0, M_FOO))
        .unwrap()
        .is_empty());
}

#[test]
fn find_class_structural_filters() {
    let kit = session();

    let all = kit
        .find_class(&ClassQuery {
            descriptor: Some("^Lcom/example/".to_string()),
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(all.len(), 3);

    let by_interface = kit
        .find_class(&ClassQuery {
            superclass: Some("Ljava/lang/Object;".to_string()),
            interfaces: vec!["Lcom/example/Iface;".to_string()],
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_interface.len(), 1);
    assert_eq!(by_interface[0].descriptor, "Lcom/example/Foo;");
    assert_eq!(by_interface[0].source_file.as_deref(), Some("Foo.java"));

    let by_source = kit
        .find_class(&ClassQuery {
            source_file: Some("Foo.java".to_string()),
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_source.len(), 1);

    let by_annotation = kit
        .find_class(&ClassQuery {
            annotation: Some("Anno;$".to_string()),
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_annotation.len(), 1);
    assert_eq!(by_annotation[0].descriptor, "Lcom/example/Foo;");
}

#[test]
fn find_class_by_strings_and_members() {
    let kit = session();

    let by_string = kit
        .find_class(&ClassQuery {
            using_strings: vec!["OK".to_string()],
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_string.len(), 1);
    assert_eq!(by_string[0].descriptor, "Lcom/example/Bar;");

    let by_own_name = kit
        .find_class(&ClassQuery {
            using_strings: vec!["^Lcom/example/Foo;$".to_string()],
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_own_name.len(), 1);
    assert_eq!(by_own_name[0].descriptor, "Lcom/example/Foo;");

    let by_method = kit
        .find_class(&ClassQuery {
            method: Some(Box::new(MethodQuery {
                name: Some("^bar$".to_string()),
                ..MethodQuery::default()
            })),
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_method.len(), 1);
    assert_eq!(by_method[0].descriptor, "Lcom/example/Bar;");

    let by_field = kit
        .find_class(&ClassQuery {
            field: Some(Box::new(FieldQuery {
                type_descriptor: Some("Ljava/lang/String;".to_string()),
                ..FieldQuery::default()
            })),
            ..ClassQuery::default()
        })
        .unwrap();
    assert_eq!(by_field.len(), 1);
    assert_eq!(by_field[0].descriptor, "Lcom/example/Bar;");
}

#[test]
fn find_method_filters() {
    let kit = session();

    let by_name = kit
        .find_method(&MethodQuery {
            name: Some("^foo$".to_string()),
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].descriptor(), "Lcom/example/Foo;->foo()V");

    // proto shape with a wildcard second parameter
    let by_shape = kit
        .find_method(&MethodQuery {
            return_type: Some("I".to_string()),
            param_types: Some(vec![Some("I".to_string()), None]),
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_shape.len(), 1);
    assert_eq!(by_shape[0].name, "compute");
    assert_eq!(by_shape[0].shorty, "IIL");

    let by_flags = kit
        .find_method(&MethodQuery {
            access_flags: ACC_STATIC,
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_flags.len(), 1);
    assert_eq!(by_flags[0].name, "bar");

    let by_string = kit
        .find_method(&MethodQuery {
            using_strings: vec!["SEND_SMS".to_string()],
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_string.len(), 1);
    assert_eq!(by_string[0].name, "bar");

    let by_op_codes = kit
        .find_method(&MethodQuery {
            op_codes: vec![0x60, 0x67],
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_op_codes.len(), 1);
    assert_eq!(by_op_codes[0].name, "bar");

    let by_class = kit
        .find_method(&MethodQuery {
            declaring_class: Some(Box::new(ClassQuery {
                descriptor: Some("Bar;$".to_string()),
                ..ClassQuery::default()
            })),
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(by_class.len(), 3);
}

#[test]
fn find_method_call_graph_predicates() {
    let kit = session();

    let invokers = kit
        .find_method(&MethodQuery {
            invokes: Some(Box::new(MethodQuery {
                name: Some("^bar$".to_string()),
                ..MethodQuery::default()
            })),
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(invokers.len(), 1);
    assert_eq!(invokers[0].name, "foo");

    let called = kit
        .find_method(&MethodQuery {
            called_by: Some(Box::new(MethodQuery {
                name: Some("^foo$".to_string()),
                ..MethodQuery::default()
            })),
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(called.len(), 1);
    assert_eq!(called[0].name, "bar");

    let writers = kit
        .find_method(&MethodQuery {
            using_fields: vec![FieldUsageQuery {
                field: FieldQuery {
                    name: Some("^count$".to_string()),
                    ..FieldQuery::default()
                },
                access: Some(dexkit::file::FieldAccess::Write),
            }],
            ..MethodQuery::default()
        })
        .unwrap();
    assert_eq!(writers.len(), 1);
    assert_eq!(writers[0].name, "bar");
}

#[test]
fn find_field_filters() {
    let kit = session();

    let by_name = kit
        .find_field(&FieldQuery {
            name: Some("^count$".to_string()),
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].descriptor(), "Lcom/example/Bar;->count:I");

    let by_type = kit
        .find_field(&FieldQuery {
            type_descriptor: Some("Ljava/lang/String;".to_string()),
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].name, "name");

    let by_flags = kit
        .find_field(&FieldQuery {
            access_flags: ACC_STATIC,
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_flags.len(), 1);
    assert_eq!(by_flags[0].name, "count");

    let by_reader = kit
        .find_field(&FieldQuery {
            read_by: Some(Box::new(MethodQuery {
                name: Some("^baz$".to_string()),
                ..MethodQuery::default()
            })),
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_reader.len(), 1);
    assert_eq!(by_reader[0].name, "name");

    let by_writer = kit
        .find_field(&FieldQuery {
            written_by: Some(Box::new(MethodQuery {
                name: Some("^bar$".to_string()),
                ..MethodQuery::default()
            })),
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_writer.len(), 1);
    assert_eq!(by_writer[0].name, "count");

    let by_annotation = kit
        .find_field(&FieldQuery {
            annotation: Some("Anno;$".to_string()),
            ..FieldQuery::default()
        })
        .unwrap();
    assert_eq!(by_annotation.len(), 1);
    assert_eq!(by_annotation[0].name, "count");
}

#[test]
fn descriptor_lookups_and_id_roundtrip() {
    let kit = session();

    let class = kit.get_class_data("Lcom/example/Bar;").unwrap().unwrap();
    assert_eq!(class.id, EncodedId::class(0, C_BAR));
    assert_eq!(class.superclass.as_deref(), Some("Ljava/lang/Object;"));

    let method = kit
        .get_method_data("Lcom/example/Bar;->compute(ILjava/lang/String;)I")
        .unwrap()
        .unwrap();
    assert_eq!(method.id, EncodedId::method(0, M_COMPUTE));
    assert_eq!(method.param_types, vec!["I", "Ljava/lang/String;"]);

    let field = kit.get_field_data("Lcom/example/Bar;->count:I").unwrap().unwrap();
    assert_eq!(field.id, EncodedId::field(0, F_COUNT));

    assert!(kit.get_class_data("Lcom/example/Nope;").unwrap().is_none());

    // by-ids round trips, duplicates collapse, order is stable
    let classes = kit
        .get_class_by_ids(&[class.id, EncodedId::class(0, C_FOO), class.id])
        .unwrap();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].descriptor, "Lcom/example/Foo;");
    assert_eq!(classes[1].descriptor, "Lcom/example/Bar;");

    let methods = kit.get_method_by_ids(&[method.id]).unwrap();
    assert_eq!(methods, vec![method]);
    let fields = kit.get_field_by_ids(&[field.id]).unwrap();
    assert_eq!(fields, vec![field]);

    // kind mismatch is a query error
    assert!(matches!(
        kit.get_method_by_ids(&[EncodedId::class(0, 0)]),
        Err(DexKitError::QueryMalformed(_))
    ));
}

#[test]
fn identical_queries_encode_identically() {
    let kit = session();
    let query = ClassQuery {
        using_strings: vec!["OK".to_string()],
        ..ClassQuery::default()
    };
    let first = encode_classes(&kit.find_class(&query).unwrap(), Projection::Full);
    let second = encode_classes(&kit.find_class(&query).unwrap(), Projection::Full);
    assert_eq!(first, second);

    let ids = encode_classes(&kit.find_class(&query).unwrap(), Projection::Ids);
    assert_ne!(first, ids);
}

#[test]
fn full_cache_does_not_change_results() {
    let lazy = session();
    let eager = session();
    eager.set_thread_num(2);
    eager.init_full_cache().unwrap();

    let query = groups(&[("g", &["android.permission.SEND_SMS", "OK"])]);
    let a = lazy.batch_find_class_using_strings(&query).unwrap();
    let b = eager.batch_find_class_using_strings(&query).unwrap();
    assert_eq!(a, b);
}

#[test]
fn multi_dex_ordering_and_ordinals() {
    let kit = DexKit::from_bytes(&[sample_dex(), second_dex()]).unwrap();
    assert_eq!(kit.get_dex_num(), 2);

    let found = kit
        .batch_find_class_using_strings(&groups(&[("ok", &["OK"])]))
        .unwrap();
    let descriptors: Vec<&str> = found["ok"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(descriptors, vec!["Lcom/example/Bar;", "Lcom/second/Baz;"]);
    assert_eq!(found["ok"][0].id.dex(), 0);
    assert_eq!(found["ok"][1].id.dex(), 1);
}

#[test]
fn export_and_reload() {
    let kit = DexKit::from_bytes(&[sample_dex(), second_dex()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    kit.export_dex_file(dir.path()).unwrap();

    let first = dir.path().join("classes.dex");
    let second = dir.path().join("classes2.dex");
    assert!(first.is_file() && second.is_file());

    let mut reloaded = DexKit::from_dex_path(&first).unwrap();
    assert!(reloaded.get_class_data("Lcom/example/Foo;").unwrap().is_some());
    assert!(reloaded.get_class_data("Lcom/second/Baz;").unwrap().is_none());

    // incrementally added images join the session with the next ordinal
    reloaded.add_dex_path(&second).unwrap();
    assert_eq!(reloaded.get_dex_num(), 2);
    let baz = reloaded.get_class_data("Lcom/second/Baz;").unwrap().unwrap();
    assert_eq!(baz.id.dex(), 1);

    reloaded.add_image(&sample_dex()).unwrap();
    assert_eq!(reloaded.get_dex_num(), 3);
}

#[test]
fn zip_loading() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let apk_path = dir.path().join("app.apk");
    {
        let file = std::fs::File::create(&apk_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(b"Manifest-Version: 1.0\n").unwrap();
        writer.start_file("classes.dex", options).unwrap();
        writer.write_all(&sample_dex()).unwrap();
        writer.start_file("classes2.dex", options).unwrap();
        writer.write_all(&second_dex()).unwrap();
        writer.finish().unwrap();
    }

    let mut kit = DexKit::from_zip_path(&apk_path).unwrap();
    assert_eq!(kit.get_dex_num(), 2);
    assert!(kit.get_class_data("Lcom/second/Baz;").unwrap().is_some());

    kit.add_zip_path(&apk_path).unwrap();
    assert_eq!(kit.get_dex_num(), 4);

    // archives without dex entries are refused
    let empty_path = dir.path().join("empty.zip");
    {
        let file = std::fs::File::create(&empty_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("assets/readme.txt", options).unwrap();
        writer.write_all(b"nothing here").unwrap();
        writer.finish().unwrap();
    }
    assert!(matches!(
        DexKit::from_zip_path(&empty_path),
        Err(DexKitError::EmptyArchive { .. })
    ));

    assert!(matches!(
        DexKit::from_zip_path(dir.path().join("missing.apk")),
        Err(DexKitError::FileNotFound { .. })
    ));
}

#[test]
fn invalid_images_are_rejected() {
    assert!(matches!(
        DexKit::from_bytes(&[b"garbage".to_vec()]),
        Err(DexKitError::InvalidImage(_))
    ));

    // a wrong file_size in the header makes the image unusable
    let mut bad = sample_dex();
    bad.push(0);
    assert!(DexKit::from_bytes(&[bad]).is_err());
}

#[test]
fn broken_image_degrades_gracefully() {
    let mut corrupt = sample_dex();
    // point the string id table past the end of the image
    corrupt[0x3C..0x40].copy_from_slice(&0x0FFF_FFF0u32.to_le_bytes());
    let checksum = adler32::adler32(&corrupt[12..]).unwrap();
    corrupt[8..12].copy_from_slice(&checksum.to_le_bytes());

    let kit = DexKit::from_bytes(&[second_dex(), corrupt]).unwrap();
    assert_eq!(kit.get_dex_num(), 2);

    // queries keep going over the healthy image
    let found = kit
        .batch_find_class_using_strings(&groups(&[("ok", &["OK"])]))
        .unwrap();
    let descriptors: Vec<&str> = found["ok"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(descriptors, vec!["Lcom/second/Baz;"]);

    // id lookups into the broken image fail loudly
    assert!(matches!(
        kit.get_using_strings(EncodedId::method(1, 0)),
        Err(DexKitError::IndexUnavailable { dex: 1, .. })
    ));
}

#[test]
fn unknown_opcode_marks_image_unusable() {
    let _ = env_logger::builder().is_test(true).try_init();

    // one healthy method, one with an unused opcode buried mid-body
    let mut b = DexBuilder::new();
    let s_ok = b.string("OK");
    let m_good = b.method("Lcom/bad/Havoc;", "good", "V", &[]);
    let m_bad = b.method("Lcom/bad/Havoc;", "bad", "V", &[]);
    let havoc = b.class("Lcom/bad/Havoc;", Some("Ljava/lang/Object;"), ACC_PUBLIC);
    b.add_method(
        havoc,
        m_good,
        ACC_PUBLIC,
        false,
        Some(CodeSpec::new(1, vec![0x001A, s_ok as u16, 0x000E])),
    );
    b.add_method(
        havoc,
        m_bad,
        ACC_PUBLIC,
        false,
        Some(CodeSpec::new(1, vec![0x0000, 0x003E, 0x000E])), // nop; unused-3e
    );
    let bad_dex = b.build();

    // fresh session, no prior scans: the code walk fails inside this call
    // and must come back as IndexUnavailable, not a raw parse error
    let kit = DexKit::from_bytes(&[bad_dex, second_dex()]).unwrap();
    let err = kit.get_using_strings(EncodedId::method(0, m_good)).unwrap_err();
    assert!(matches!(err, DexKitError::IndexUnavailable { dex: 0, .. }));

    // the image stays excluded afterwards
    assert!(matches!(
        kit.get_method_op_codes(EncodedId::method(0, m_good)),
        Err(DexKitError::IndexUnavailable { dex: 0, .. })
    ));

    // scans keep going over the healthy image
    let found = kit
        .batch_find_class_using_strings(&groups(&[("ok", &["OK"])]))
        .unwrap();
    let descriptors: Vec<&str> = found["ok"].iter().map(|c| c.descriptor.as_str()).collect();
    assert_eq!(descriptors, vec!["Lcom/second/Baz;"]);
}

#[test]
fn container_level_accessors() {
    let image = DexImage::from_bytes(&sample_dex(), "[test]").unwrap();
    let dex = image.open().unwrap();
    dex.verify_checksum().unwrap();

    let class_def = dex.get_class_def(C_FOO).unwrap();
    let members = dex
        .get_class_members(class_def.class_data_off)
        .unwrap()
        .unwrap();
    assert_eq!(members.methods.len(), 1);
    let accessor = dex
        .get_code_item_accessor(members.methods[0].code_off)
        .unwrap();
    assert_eq!(accessor.registers_size(), 1);
    assert_eq!(accessor.insns_size_in_code_units(), 6);
    assert!(dex.get_try_items(&accessor).unwrap().is_empty());
}
