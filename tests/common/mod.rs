//! In-memory dex image builder for the integration tests. Emits the real
//! binary layout (header, id tables, class data, code items, annotations,
//! debug info) so the tests run hermetically, without an Android
//! toolchain.

#![allow(dead_code)]

#[derive(Clone)]
pub struct CodeSpec {
    pub registers: u16,
    pub ins: u16,
    pub outs: u16,
    pub insns: Vec<u16>,
    pub param_names: Option<Vec<Option<String>>>,
}

impl CodeSpec {
    pub fn new(registers: u16, insns: Vec<u16>) -> CodeSpec {
        CodeSpec {
            registers,
            ins: 0,
            outs: 0,
            insns,
            param_names: None,
        }
    }

    pub fn with_param_names(mut self, names: &[Option<&str>]) -> CodeSpec {
        self.param_names = Some(
            names
                .iter()
                .map(|n| n.map(|s| s.to_string()))
                .collect(),
        );
        self
    }
}

#[derive(Clone)]
struct AnnoSpec {
    type_idx: u16,
    // name string id -> small non-negative int value
    elements: Vec<(u32, i32)>,
}

#[derive(Clone)]
struct FieldSpec {
    field_idx: u32,
    access_flags: u32,
    is_static: bool,
}

#[derive(Clone)]
struct MethodSpec {
    method_idx: u32,
    access_flags: u32,
    direct: bool,
    code: Option<CodeSpec>,
}

#[derive(Clone, Default)]
struct ClassSpec {
    class_type: u16,
    access_flags: u32,
    superclass: Option<u16>,
    interfaces: Vec<u16>,
    source_file: Option<u32>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    class_annotations: Vec<AnnoSpec>,
    method_annotations: Vec<(u32, AnnoSpec)>,
    field_annotations: Vec<(u32, AnnoSpec)>,
    // method idx -> per-parameter annotation (None = no annotations)
    parameter_annotations: Vec<(u32, Vec<Option<AnnoSpec>>)>,
}

struct ProtoSpec {
    shorty: u32,
    return_type: u16,
    params: Vec<u16>,
}

#[derive(Default)]
pub struct DexBuilder {
    strings: Vec<String>,
    types: Vec<u32>,
    protos: Vec<ProtoSpec>,
    fields: Vec<(u16, u16, u32)>,
    methods: Vec<(u16, u16, u32)>,
    classes: Vec<ClassSpec>,
}

fn shorty_char(desc: &str) -> char {
    match desc.as_bytes()[0] {
        b'[' | b'L' => 'L',
        c => c as char,
    }
}

impl DexBuilder {
    pub fn new() -> DexBuilder {
        DexBuilder::default()
    }

    pub fn string(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|have| have == s) {
            Some(idx) => idx as u32,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    pub fn type_desc(&mut self, desc: &str) -> u16 {
        let sid = self.string(desc);
        match self.types.iter().position(|&have| have == sid) {
            Some(idx) => idx as u16,
            None => {
                self.types.push(sid);
                (self.types.len() - 1) as u16
            }
        }
    }

    pub fn proto(&mut self, ret: &str, params: &[&str]) -> u16 {
        let mut shorty = String::new();
        shorty.push(shorty_char(ret));
        for p in params {
            shorty.push(shorty_char(p));
        }
        let shorty = self.string(&shorty);
        let return_type = self.type_desc(ret);
        let params: Vec<u16> = params.iter().map(|p| self.type_desc(p)).collect();
        match self.protos.iter().position(|have| {
            have.shorty == shorty && have.return_type == return_type && have.params == params
        }) {
            Some(idx) => idx as u16,
            None => {
                self.protos.push(ProtoSpec {
                    shorty,
                    return_type,
                    params,
                });
                (self.protos.len() - 1) as u16
            }
        }
    }

    pub fn field(&mut self, class: &str, name: &str, ty: &str) -> u32 {
        let class_type = self.type_desc(class);
        let type_idx = self.type_desc(ty);
        let name_sid = self.string(name);
        match self
            .fields
            .iter()
            .position(|&have| have == (class_type, type_idx, name_sid))
        {
            Some(idx) => idx as u32,
            None => {
                self.fields.push((class_type, type_idx, name_sid));
                (self.fields.len() - 1) as u32
            }
        }
    }

    pub fn method(&mut self, class: &str, name: &str, ret: &str, params: &[&str]) -> u32 {
        let class_type = self.type_desc(class);
        let proto = self.proto(ret, params);
        let name_sid = self.string(name);
        match self
            .methods
            .iter()
            .position(|&have| have == (class_type, proto, name_sid))
        {
            Some(idx) => idx as u32,
            None => {
                self.methods.push((class_type, proto, name_sid));
                (self.methods.len() - 1) as u32
            }
        }
    }

    pub fn class(&mut self, desc: &str, superclass: Option<&str>, access_flags: u32) -> usize {
        let class_type = self.type_desc(desc);
        let superclass = superclass.map(|s| self.type_desc(s));
        self.classes.push(ClassSpec {
            class_type,
            access_flags,
            superclass,
            ..ClassSpec::default()
        });
        self.classes.len() - 1
    }

    pub fn set_source_file(&mut self, class: usize, name: &str) {
        let sid = self.string(name);
        self.classes[class].source_file = Some(sid);
    }

    pub fn add_interface(&mut self, class: usize, desc: &str) {
        let type_idx = self.type_desc(desc);
        self.classes[class].interfaces.push(type_idx);
    }

    pub fn add_field(&mut self, class: usize, field_idx: u32, access_flags: u32, is_static: bool) {
        self.classes[class].fields.push(FieldSpec {
            field_idx,
            access_flags,
            is_static,
        });
    }

    pub fn add_method(
        &mut self,
        class: usize,
        method_idx: u32,
        access_flags: u32,
        direct: bool,
        code: Option<CodeSpec>,
    ) {
        self.classes[class].methods.push(MethodSpec {
            method_idx,
            access_flags,
            direct,
            code,
        });
    }

    fn anno(&mut self, desc: &str, elements: &[(&str, i32)]) -> AnnoSpec {
        let type_idx = self.type_desc(desc);
        let elements = elements
            .iter()
            .map(|(name, value)| {
                assert!((0..=127).contains(value), "builder only emits small ints");
                (self.string(name), *value)
            })
            .collect();
        AnnoSpec { type_idx, elements }
    }

    pub fn annotate_class(&mut self, class: usize, desc: &str, elements: &[(&str, i32)]) {
        let spec = self.anno(desc, elements);
        self.classes[class].class_annotations.push(spec);
    }

    pub fn annotate_method(&mut self, class: usize, method_idx: u32, desc: &str) {
        let spec = self.anno(desc, &[]);
        self.classes[class].method_annotations.push((method_idx, spec));
    }

    pub fn annotate_field(&mut self, class: usize, field_idx: u32, desc: &str) {
        let spec = self.anno(desc, &[]);
        self.classes[class].field_annotations.push((field_idx, spec));
    }

    /// Annotates one parameter of a method; `param_count` fixes the length
    /// of the per-parameter list.
    pub fn annotate_parameter(
        &mut self,
        class: usize,
        method_idx: u32,
        param_count: usize,
        param_index: usize,
        desc: &str,
    ) {
        let spec = self.anno(desc, &[]);
        let class_spec = &mut self.classes[class];
        let pos = match class_spec
            .parameter_annotations
            .iter()
            .position(|(idx, _)| *idx == method_idx)
        {
            Some(pos) => pos,
            None => {
                class_spec
                    .parameter_annotations
                    .push((method_idx, vec![None; param_count]));
                class_spec.parameter_annotations.len() - 1
            }
        };
        class_spec.parameter_annotations[pos].1[param_index] = Some(spec);
    }

    pub fn build(&mut self) -> Vec<u8> {
        // parameter names live in the string table too
        let pending: Vec<String> = self
            .classes
            .iter()
            .flat_map(|class| class.methods.iter())
            .filter_map(|method| method.code.as_ref())
            .filter_map(|code| code.param_names.as_ref())
            .flatten()
            .flatten()
            .cloned()
            .collect();
        for name in pending {
            self.string(&name);
        }

        let header_size = 0x70usize;
        let num_strings = self.strings.len();
        let num_types = self.types.len();
        let num_protos = self.protos.len();
        let num_fields = self.fields.len();
        let num_methods = self.methods.len();
        let num_classes = self.classes.len();

        let string_ids_off = header_size;
        let type_ids_off = string_ids_off + 4 * num_strings;
        let proto_ids_off = type_ids_off + 4 * num_types;
        let field_ids_off = proto_ids_off + 12 * num_protos;
        let method_ids_off = field_ids_off + 8 * num_fields;
        let class_defs_off = method_ids_off + 8 * num_methods;
        let data_off = class_defs_off + 32 * num_classes;

        let mut data: Vec<u8> = Vec::new();
        let abs = |data: &Vec<u8>| (data_off + data.len()) as u32;
        let align4 = |data: &mut Vec<u8>| {
            while (data_off + data.len()) % 4 != 0 {
                data.push(0);
            }
        };

        // proto parameter type lists
        let mut proto_param_offs = vec![0u32; num_protos];
        for (i, proto) in self.protos.iter().enumerate() {
            if proto.params.is_empty() {
                continue;
            }
            align4(&mut data);
            proto_param_offs[i] = abs(&data);
            push_u32(&mut data, proto.params.len() as u32);
            for &t in &proto.params {
                push_u16(&mut data, t);
            }
        }

        // interface type lists
        let mut interface_offs = vec![0u32; num_classes];
        for (i, class) in self.classes.iter().enumerate() {
            if class.interfaces.is_empty() {
                continue;
            }
            align4(&mut data);
            interface_offs[i] = abs(&data);
            push_u32(&mut data, class.interfaces.len() as u32);
            for &t in &class.interfaces {
                push_u16(&mut data, t);
            }
        }

        // debug info items
        let mut debug_offs: Vec<(u32, u32)> = Vec::new(); // (method idx, off)
        for class in &self.classes {
            for method in &class.methods {
                let names = match &method.code {
                    Some(code) => match &code.param_names {
                        Some(names) => names,
                        None => continue,
                    },
                    None => continue,
                };
                let off = abs(&data);
                push_uleb(&mut data, 1); // line_start
                push_uleb(&mut data, names.len() as u32);
                for name in names {
                    match name {
                        // uleb128p1
                        None => push_uleb(&mut data, 0),
                        Some(name) => {
                            let sid = self
                                .strings
                                .iter()
                                .position(|s| s == name)
                                .expect("parameter name string was never interned")
                                as u32;
                            push_uleb(&mut data, sid + 1);
                        }
                    }
                }
                data.push(0x00); // DBG_END_SEQUENCE
                debug_offs.push((method.method_idx, off));
            }
        }

        // code items
        let mut code_offs: Vec<(u32, u32)> = Vec::new(); // (method idx, off)
        for class in &self.classes {
            for method in &class.methods {
                let code = match &method.code {
                    Some(code) => code,
                    None => continue,
                };
                align4(&mut data);
                let off = abs(&data);
                let debug_off = debug_offs
                    .iter()
                    .find(|(idx, _)| *idx == method.method_idx)
                    .map(|(_, off)| *off)
                    .unwrap_or(0);
                push_u16(&mut data, code.registers);
                push_u16(&mut data, code.ins);
                push_u16(&mut data, code.outs);
                push_u16(&mut data, 0); // tries_size
                push_u32(&mut data, debug_off);
                push_u32(&mut data, code.insns.len() as u32);
                for &unit in &code.insns {
                    push_u16(&mut data, unit);
                }
                code_offs.push((method.method_idx, off));
            }
        }

        // annotation items, sets, ref lists, directories
        let push_anno_item = |data: &mut Vec<u8>, spec: &AnnoSpec| -> u32 {
            let off = abs(data);
            data.push(0x01); // VISIBILITY_RUNTIME
            push_uleb(data, spec.type_idx as u32);
            push_uleb(data, spec.elements.len() as u32);
            for &(name_sid, value) in &spec.elements {
                push_uleb(data, name_sid);
                data.push(0x04); // VALUE_INT, one byte
                data.push(value as u8);
            }
            off
        };
        let anno_set = |data: &mut Vec<u8>, specs: &[AnnoSpec]| -> u32 {
            let item_offs: Vec<u32> =
                specs.iter().map(|spec| push_anno_item(data, spec)).collect();
            align4(data);
            let off = abs(data);
            push_u32(data, item_offs.len() as u32);
            for item_off in item_offs {
                push_u32(data, item_off);
            }
            off
        };

        let mut directory_offs = vec![0u32; num_classes];
        for (i, class) in self.classes.iter().enumerate() {
            let has_annotations = !class.class_annotations.is_empty()
                || !class.method_annotations.is_empty()
                || !class.field_annotations.is_empty()
                || !class.parameter_annotations.is_empty();
            if !has_annotations {
                continue;
            }

            let class_set_off = if class.class_annotations.is_empty() {
                0
            } else {
                anno_set(&mut data, &class.class_annotations)
            };

            let mut field_entries: Vec<(u32, u32)> = class
                .field_annotations
                .iter()
                .map(|(field_idx, spec)| {
                    (*field_idx, anno_set(&mut data, std::slice::from_ref(spec)))
                })
                .collect();
            field_entries.sort();

            let mut method_entries: Vec<(u32, u32)> = class
                .method_annotations
                .iter()
                .map(|(method_idx, spec)| {
                    (*method_idx, anno_set(&mut data, std::slice::from_ref(spec)))
                })
                .collect();
            method_entries.sort();

            let mut param_entries: Vec<(u32, u32)> = Vec::new();
            for (method_idx, sets) in &class.parameter_annotations {
                let set_offs: Vec<u32> = sets
                    .iter()
                    .map(|set| match set {
                        Some(spec) => anno_set(&mut data, std::slice::from_ref(spec)),
                        None => {
                            // empty set, still present so the parameter
                            // count stays intact
                            align4(&mut data);
                            let off = abs(&data);
                            push_u32(&mut data, 0);
                            off
                        }
                    })
                    .collect();
                align4(&mut data);
                let list_off = abs(&data);
                push_u32(&mut data, set_offs.len() as u32);
                for off in set_offs {
                    push_u32(&mut data, off);
                }
                param_entries.push((*method_idx, list_off));
            }
            param_entries.sort();

            align4(&mut data);
            directory_offs[i] = abs(&data);
            push_u32(&mut data, class_set_off);
            push_u32(&mut data, field_entries.len() as u32);
            push_u32(&mut data, method_entries.len() as u32);
            push_u32(&mut data, param_entries.len() as u32);
            for (idx, off) in field_entries {
                push_u32(&mut data, idx);
                push_u32(&mut data, off);
            }
            for (idx, off) in method_entries {
                push_u32(&mut data, idx);
                push_u32(&mut data, off);
            }
            for (idx, off) in param_entries {
                push_u32(&mut data, idx);
                push_u32(&mut data, off);
            }
        }

        // class data
        let mut class_data_offs = vec![0u32; num_classes];
        for (i, class) in self.classes.iter().enumerate() {
            if class.fields.is_empty() && class.methods.is_empty() {
                continue;
            }
            class_data_offs[i] = abs(&data);

            let mut static_fields: Vec<&FieldSpec> =
                class.fields.iter().filter(|f| f.is_static).collect();
            let mut instance_fields: Vec<&FieldSpec> =
                class.fields.iter().filter(|f| !f.is_static).collect();
            let mut direct_methods: Vec<&MethodSpec> =
                class.methods.iter().filter(|m| m.direct).collect();
            let mut virtual_methods: Vec<&MethodSpec> =
                class.methods.iter().filter(|m| !m.direct).collect();
            static_fields.sort_by_key(|f| f.field_idx);
            instance_fields.sort_by_key(|f| f.field_idx);
            direct_methods.sort_by_key(|m| m.method_idx);
            virtual_methods.sort_by_key(|m| m.method_idx);

            push_uleb(&mut data, static_fields.len() as u32);
            push_uleb(&mut data, instance_fields.len() as u32);
            push_uleb(&mut data, direct_methods.len() as u32);
            push_uleb(&mut data, virtual_methods.len() as u32);

            for group in [static_fields, instance_fields] {
                let mut prev = 0;
                for field in group {
                    push_uleb(&mut data, field.field_idx - prev);
                    push_uleb(&mut data, field.access_flags);
                    prev = field.field_idx;
                }
            }
            for group in [direct_methods, virtual_methods] {
                let mut prev = 0;
                for method in group {
                    let code_off = code_offs
                        .iter()
                        .find(|(idx, _)| *idx == method.method_idx)
                        .map(|(_, off)| *off)
                        .unwrap_or(0);
                    push_uleb(&mut data, method.method_idx - prev);
                    push_uleb(&mut data, method.access_flags);
                    push_uleb(&mut data, code_off);
                    prev = method.method_idx;
                }
            }
        }

        // string data
        let mut string_data_offs = vec![0u32; num_strings];
        for (i, s) in self.strings.iter().enumerate() {
            string_data_offs[i] = abs(&data);
            push_uleb(&mut data, s.encode_utf16().count() as u32);
            data.extend_from_slice(&mutf8(s));
            data.push(0);
        }

        // assemble the image
        let total = data_off + data.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"dex\n035\0");
        push_u32(&mut out, 0); // checksum, patched below
        out.extend_from_slice(&[0u8; 20]); // signature
        push_u32(&mut out, total as u32);
        push_u32(&mut out, header_size as u32);
        push_u32(&mut out, 0x12345678); // endian_tag
        push_u32(&mut out, 0); // link_size
        push_u32(&mut out, 0); // link_off
        push_u32(&mut out, 0); // map_off
        push_u32(&mut out, num_strings as u32);
        push_u32(&mut out, string_ids_off as u32);
        push_u32(&mut out, num_types as u32);
        push_u32(&mut out, type_ids_off as u32);
        push_u32(&mut out, num_protos as u32);
        push_u32(&mut out, proto_ids_off as u32);
        push_u32(&mut out, num_fields as u32);
        push_u32(&mut out, field_ids_off as u32);
        push_u32(&mut out, num_methods as u32);
        push_u32(&mut out, method_ids_off as u32);
        push_u32(&mut out, num_classes as u32);
        push_u32(&mut out, class_defs_off as u32);
        push_u32(&mut out, data.len() as u32);
        push_u32(&mut out, data_off as u32);
        assert_eq!(out.len(), header_size);

        for off in string_data_offs {
            push_u32(&mut out, off);
        }
        for &sid in &self.types {
            push_u32(&mut out, sid);
        }
        for (i, proto) in self.protos.iter().enumerate() {
            push_u32(&mut out, proto.shorty);
            push_u16(&mut out, proto.return_type);
            push_u16(&mut out, 0);
            push_u32(&mut out, proto_param_offs[i]);
        }
        for &(class_type, type_idx, name_sid) in &self.fields {
            push_u16(&mut out, class_type);
            push_u16(&mut out, type_idx);
            push_u32(&mut out, name_sid);
        }
        for &(class_type, proto_idx, name_sid) in &self.methods {
            push_u16(&mut out, class_type);
            push_u16(&mut out, proto_idx);
            push_u32(&mut out, name_sid);
        }
        for (i, class) in self.classes.iter().enumerate() {
            push_u16(&mut out, class.class_type);
            push_u16(&mut out, 0);
            push_u32(&mut out, class.access_flags);
            match class.superclass {
                Some(idx) => {
                    push_u16(&mut out, idx);
                    push_u16(&mut out, 0);
                }
                None => {
                    push_u16(&mut out, 0xFFFF);
                    push_u16(&mut out, 0xFFFF);
                }
            }
            push_u32(&mut out, interface_offs[i]);
            push_u32(&mut out, class.source_file.unwrap_or(0xFFFF_FFFF));
            push_u32(&mut out, directory_offs[i]);
            push_u32(&mut out, class_data_offs[i]);
            push_u32(&mut out, 0); // static_values_off
        }
        assert_eq!(out.len(), data_off);
        out.extend_from_slice(&data);

        // patch the checksum
        let checksum = adler32::adler32(&out[12..]).expect("in-memory read");
        out[8..12].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_uleb(out: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v != 0 {
            out.push(byte | 0x80);
        } else {
            out.push(byte);
            break;
        }
    }
}

fn mutf8(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in s.encode_utf16() {
        match unit {
            0 => out.extend_from_slice(&[0xC0, 0x80]),
            1..=0x7F => out.push(unit as u8),
            0x80..=0x7FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
