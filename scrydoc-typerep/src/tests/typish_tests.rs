use crate::*;
use std::sync::Arc;

fn arg(name: &str, ty: &str) -> Sym {
    Typish::Descriptor(Descriptor::new(
        DescriptorKind::Arg {
            multiplicity: Multiplicity::Required,
            default: None,
        },
        name,
        Typish::type_ref(ty),
        Vec::new(),
    ))
    .into_sym()
}

fn constant(name: &str, n: f64) -> Sym {
    Typish::NamedValue(NamedValue {
        name: Some(name.to_string()),
        value: Some(scrydoc_js::Scalar::Number(n)),
        genus: "Number".to_string(),
        life: LifeStory::default(),
        doc: Vec::new(),
    })
    .into_sym()
}

fn object(kind: ObjectKind, name: &str) -> ObjectSym {
    ObjectSym::new(kind, Some(name.to_string()), LifeStory::default())
}

#[test]
fn test_members_partition() {
    let mut members = Members::new();
    assert!(members.file("a", constant("a", 1.0), None));
    assert!(members.file("b", constant("b", 2.0), Some(("G", &Vec::new()))));
    assert!(members.file("c", constant("c", 3.0), Some(("G", &Vec::new()))));
    members.declare_group("Empty", Vec::new());

    assert_eq!(members.len(), 3);
    assert_eq!(members.ungrouped().keys().collect::<Vec<_>>(), vec!["a"]);
    let group = members.groups().get("G").unwrap();
    assert_eq!(group.children.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    assert!(members.groups().get("Empty").unwrap().children.is_empty());
    assert!(members.is_partitioned());
}

#[test]
fn test_members_first_writer_wins() {
    let mut members = Members::new();
    let first = constant("x", 1.0);
    assert!(members.file("x", first.clone(), None));
    assert!(!members.file("x", constant("x", 2.0), Some(("G", &Vec::new()))));

    assert!(Arc::ptr_eq(&members.get("x").unwrap(), &first));
    assert!(members.groups().is_empty());
    assert!(members.is_partitioned());
}

#[test]
fn test_class_traversal_modes() {
    let ctor = FuncSym::new(FuncKind::Constructor, Some("C".into()), None, LifeStory::default());
    ctor.members.write().file("create", constant("create", 0.0), None);
    ctor.members.write().file("shared", constant("ctorShared", 1.0), None);
    let proto = object(ObjectKind::Prototype, "C");
    proto.members.write().file("render", constant("render", 2.0), None);
    proto.members.write().file("shared", constant("protoShared", 3.0), None);

    let class = Typish::Class(ClassType {
        name: "C".into(),
        constructor: Typish::Func(ctor).into_sym(),
        proto: Typish::Object(proto).into_sym(),
    })
    .into_sym();

    let name_of = |found: Option<Sym>| found.and_then(|s| s.name().map(str::to_string));
    assert_eq!(name_of(class.traverse_child("render", None)).as_deref(), Some("render"));
    assert_eq!(name_of(class.traverse_child("create", None)).as_deref(), Some("create"));
    assert_eq!(name_of(class.traverse_child("shared", None)).as_deref(), Some("protoShared"));
    assert_eq!(
        name_of(class.traverse_child("shared", Some(TraverseMode::Constructor))).as_deref(),
        Some("ctorShared")
    );
    assert!(class
        .traverse_child("create", Some(TraverseMode::Instance))
        .is_none());
    assert!(class
        .traverse_child("render", Some(TraverseMode::Constructor))
        .is_none());
    assert_eq!(class.kind(), "class");
}

#[test]
fn test_arg_traversal() {
    let args = Typish::ArgList(ArgList {
        args: vec![arg("url", "String"), arg("options", "Object")],
    })
    .into_sym();
    let mut func = FuncSym::new(FuncKind::Type, None, None, LifeStory::default());
    func.args = Some(args);
    let func = Typish::Func(func).into_sym();

    let second = func.traverse_arg(ArgKey::Index(1)).unwrap();
    assert_eq!(second.name(), Some("options"));
    let url = func.traverse_arg(ArgKey::Name("url")).unwrap();
    assert_eq!(url.described_type().unwrap().name(), Some("String"));
    assert!(func.traverse_arg(ArgKey::Index(2)).is_none());

    let list = Typish::List(ListType {
        kids: vec![Typish::type_ref("Number")],
    })
    .into_sym();
    assert!(list.traverse_arg(ArgKey::Index(0)).is_some());
    assert!(list.traverse_arg(ArgKey::Name("0")).is_none());
}

#[test]
fn test_dictof_traversal() {
    let key = Typish::Descriptor(Descriptor::new(
        DescriptorKind::DictKey,
        "name",
        Typish::type_ref("String"),
        Vec::new(),
    ))
    .into_sym();
    let value = Typish::Descriptor(Descriptor::new(
        DescriptorKind::DictValue,
        "count",
        Typish::type_ref("Number"),
        Vec::new(),
    ))
    .into_sym();
    let dictof = Typish::DictOf(DictOf {
        key: key.clone(),
        value: value.clone(),
        doc: Vec::new(),
    })
    .into_sym();

    assert!(Arc::ptr_eq(&dictof.traverse_child("whatever", None).unwrap(), &key));
    assert!(Arc::ptr_eq(
        &dictof.traverse_child("whatever", Some(TraverseMode::Value)).unwrap(),
        &value
    ));
}

#[test]
fn test_type_ref_resolves_once() {
    let target = object(ObjectKind::Generic, "Point");
    target.members.write().file("x", constant("x", 0.0), None);
    let target = Typish::Object(target).into_sym();

    let reference = Typish::type_ref("Point");
    assert!(reference.traverse_child("x", None).is_none());

    let Typish::Ref(type_ref) = &*reference else {
        panic!("expected a type ref");
    };
    assert!(type_ref.resolve(target.clone()));
    assert!(!type_ref.resolve(Typish::Object(object(ObjectKind::Generic, "Other")).into_sym()));

    assert!(Arc::ptr_eq(&type_ref.target().unwrap(), &target));
    assert_eq!(reference.traverse_child("x", None).unwrap().name(), Some("x"));

    // descriptors pierce through to their type
    let field = Typish::Descriptor(Descriptor::new(DescriptorKind::Field, "p", reference, Vec::new()))
        .into_sym();
    assert!(field.traverse_child("x", None).is_some());
}

fn typedef(name: &str, ty: Sym) -> Sym {
    Typish::Typedef(Typedef {
        name: name.to_string(),
        ty,
        doc: Vec::new(),
    })
    .into_sym()
}

#[test]
fn test_type_ref_refuses_loops() {
    let to_beta = Typish::type_ref("Beta");
    let to_alpha = Typish::type_ref("Alpha");
    let alpha = typedef("Alpha", to_beta.clone());
    let beta = typedef("Beta", to_alpha.clone());
    let (Typish::Ref(beta_ref), Typish::Ref(alpha_ref)) = (&*to_beta, &*to_alpha) else {
        panic!("expected type refs");
    };

    assert!(beta_ref.resolve(beta.clone()));
    assert!(!alpha_ref.resolve(alpha.clone()));
    assert!(alpha_ref.target().is_none());
    assert!(!alpha_ref.resolve(to_alpha.clone()));

    // following the chain ends instead of going round
    assert!(alpha.traverse_child("x", None).is_none());
    assert!(beta.traverse_arg(ArgKey::Index(0)).is_none());
}

#[test]
fn test_life_story_owners() {
    let ns = Typish::Namespace(Namespace::new("pkg/mod:exports", LifeStory::default())).into_sym();
    let holder = Typish::Object(object(ObjectKind::Generic, "holder")).into_sym();
    let life = LifeStory::new(Some("pkg/mod"), Some(3));

    life.note_owner("b", &ns);
    life.note_owner("a", &holder);
    life.note_owner("b", &ns);

    let owners = life.owners();
    assert_eq!(owners.len(), 2);
    assert_eq!(life.origin_name().as_deref(), Some("b"));
    assert_eq!(owners[1].owner_name, "holder");
    assert!(Arc::ptr_eq(&owners[0].owner().unwrap(), &ns));

    drop(holder);
    assert!(life.owners()[1].owner().is_none());
}

#[test]
fn test_kinds_and_display_names() {
    let oneof = Typish::OneOf(OneOf {
        cases: Vec::new(),
        doc: Vec::new(),
    });
    assert_eq!(oneof.kind(), "oneof");
    assert_eq!(oneof.display_name(), "(oneof)");

    let dict = Typish::Object(ObjectSym::new(ObjectKind::Dict, None, LifeStory::default()));
    assert_eq!(dict.kind(), "dict");
    assert!(dict.members().is_some());

    let method = Typish::Func(FuncSym::new(
        FuncKind::Method,
        None,
        Some("_fn_meth".into()),
        LifeStory::default(),
    ));
    assert_eq!(method.kind(), "method");
    assert_eq!(method.name(), Some("_fn_meth"));
}

#[test]
fn test_types_and_values() {
    assert!(Typish::Object(object(ObjectKind::Dict, "Opts")).is_type());
    assert!(!Typish::Object(object(ObjectKind::Generic, "thing")).is_type());
    assert!(Typish::OneOf(OneOf {
        cases: Vec::new(),
        doc: Vec::new(),
    })
    .is_type());

    let functype = Typish::Func(FuncSym::new(FuncKind::Type, None, None, LifeStory::default()));
    assert!(functype.is_type());
    let instance = Typish::Func(FuncSym::new(FuncKind::Instance, None, None, LifeStory::default()));
    assert!(!instance.is_type());

    assert!(!constant("n", 1.0).is_type());
    assert!(!arg("a", "Number").is_type());
    // a textual reference is not a type until it is resolved and followed
    assert!(!Typish::type_ref("Number").is_type());
}
