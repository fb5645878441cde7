//! Assembles small class files for tests.
//!
//! Shared by the unit tests and the integration tests, so it only uses std.
#![allow(dead_code)]

use std::collections::HashMap;

/// An annotation element value to encode.
#[derive(Debug, Clone)]
pub enum Elem<'a> {
    Str(&'a str),
    Int(i32),
    Class(&'a str),
    Enum(&'a str, &'a str),
    Array(Vec<Elem<'a>>),
    Nested(&'a str, Vec<(&'a str, Elem<'a>)>),
}

#[derive(Default)]
struct Member {
    name: u16,
    descriptor: u16,
    constant: Option<u16>,
    code: Option<Vec<u8>>,
    visible: Vec<Vec<u8>>,
    invisible: Vec<Vec<u8>>,
    visible_parameters: Vec<Vec<Vec<u8>>>,
    annotation_default: Option<Vec<u8>>,
}

/// Builds a class file: constants are interned on demand, members and
/// attributes are laid out by [`ClassFixture::finish`].
pub struct ClassFixture {
    pool: Vec<u8>,
    count: u16,
    utf8: HashMap<Vec<u8>, u16>,
    strings: HashMap<u16, u16>,
    this_class: u16,
    super_class: u16,
    fields: Vec<Member>,
    methods: Vec<Member>,
    visible: Vec<Vec<u8>>,
    invisible: Vec<Vec<u8>>,
    bootstrap: Vec<(u16, Vec<u16>)>,
    extra: Vec<(String, Vec<u8>)>,
}

impl ClassFixture {
    pub fn new(name: &str) -> Self {
        let mut fx = Self {
            pool: Vec::new(),
            count: 1,
            utf8: HashMap::new(),
            strings: HashMap::new(),
            this_class: 0,
            super_class: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            visible: Vec::new(),
            invisible: Vec::new(),
            bootstrap: Vec::new(),
            extra: Vec::new(),
        };
        fx.this_class = fx.class(name);
        fx.super_class = fx.class("java/lang/Object");
        fx
    }

    fn push(&mut self, entry: &[u8], slots: u16) -> u16 {
        let index = self.count;
        self.pool.extend_from_slice(entry);
        self.count += slots;
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        self.utf8_raw(text.as_bytes())
    }

    pub fn utf8_raw(&mut self, bytes: &[u8]) -> u16 {
        if let Some(index) = self.utf8.get(bytes) {
            return *index;
        }
        let mut entry = vec![1];
        entry.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        entry.extend_from_slice(bytes);
        let index = self.push(&entry, 1);
        self.utf8.insert(bytes.to_vec(), index);
        index
    }

    pub fn string(&mut self, text: &str) -> u16 {
        self.string_raw(text.as_bytes())
    }

    pub fn string_raw(&mut self, bytes: &[u8]) -> u16 {
        let utf8 = self.utf8_raw(bytes);
        if let Some(index) = self.strings.get(&utf8) {
            return *index;
        }
        let [hi, lo] = utf8.to_be_bytes();
        let index = self.push(&[8, hi, lo], 1);
        self.strings.insert(utf8, index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let [hi, lo] = self.utf8(name).to_be_bytes();
        self.push(&[7, hi, lo], 1)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(&entry, 1)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(&entry, 2)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let [nh, nl] = self.utf8(name).to_be_bytes();
        let [dh, dl] = self.utf8(descriptor).to_be_bytes();
        self.push(&[12, nh, nl, dh, dl], 1)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let [ch, cl] = self.class(owner).to_be_bytes();
        let [nh, nl] = self.name_and_type(name, descriptor).to_be_bytes();
        self.push(&[10, ch, cl, nh, nl], 1)
    }

    /// A `REF_invokeStatic` method handle.
    pub fn method_handle(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let [rh, rl] = self.method_ref(owner, name, descriptor).to_be_bytes();
        self.push(&[15, 6, rh, rl], 1)
    }

    /// Adds a `BootstrapMethods` entry and returns its index in that table.
    pub fn bootstrap(&mut self, owner: &str, name: &str, descriptor: &str, args: Vec<u16>) -> u16 {
        let handle = self.method_handle(owner, name, descriptor);
        self.bootstrap.push((handle, args));
        (self.bootstrap.len() - 1) as u16
    }

    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let [bh, bl] = bootstrap.to_be_bytes();
        let [nh, nl] = self.name_and_type(name, descriptor).to_be_bytes();
        self.push(&[18, bh, bl, nh, nl], 1)
    }

    /// Adds a field; `constant` is the pool index for its `ConstantValue`.
    pub fn field(&mut self, name: &str, descriptor: &str, constant: Option<u16>) -> usize {
        let member = Member {
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            constant,
            ..Member::default()
        };
        self.fields.push(member);
        self.fields.len() - 1
    }

    /// Adds a method with the given code array.
    pub fn method(&mut self, name: &str, descriptor: &str, code: Vec<u8>) -> usize {
        let member = Member {
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            code: Some(code),
            ..Member::default()
        };
        self.methods.push(member);
        self.methods.len() - 1
    }

    pub fn class_annotation(&mut self, visible: bool, annotation: Vec<u8>) {
        if visible {
            self.visible.push(annotation);
        } else {
            self.invisible.push(annotation);
        }
    }

    pub fn field_annotation(&mut self, field: usize, visible: bool, annotation: Vec<u8>) {
        let member = &mut self.fields[field];
        if visible {
            member.visible.push(annotation);
        } else {
            member.invisible.push(annotation);
        }
    }

    pub fn method_annotation(&mut self, method: usize, visible: bool, annotation: Vec<u8>) {
        let member = &mut self.methods[method];
        if visible {
            member.visible.push(annotation);
        } else {
            member.invisible.push(annotation);
        }
    }

    /// Adds a visible annotation to parameter `parameter` of a method.
    pub fn parameter_annotation(&mut self, method: usize, parameter: usize, annotation: Vec<u8>) {
        let params = &mut self.methods[method].visible_parameters;
        if params.len() <= parameter {
            params.resize_with(parameter + 1, Vec::new);
        }
        params[parameter].push(annotation);
    }

    pub fn annotation_default(&mut self, method: usize, value: Elem<'_>) {
        let encoded = self.element(value);
        self.methods[method].annotation_default = Some(encoded);
    }

    /// Adds a class attribute this fixture knows nothing about.
    pub fn class_attribute(&mut self, name: &str, body: Vec<u8>) {
        self.utf8(name);
        self.extra.push((name.to_string(), body));
    }

    /// Encodes one annotation structure.
    pub fn annotation(&mut self, type_descriptor: &str, elements: Vec<(&str, Elem<'_>)>) -> Vec<u8> {
        let mut out = self.utf8(type_descriptor).to_be_bytes().to_vec();
        out.extend_from_slice(&(elements.len() as u16).to_be_bytes());
        for (name, value) in elements {
            out.extend_from_slice(&self.utf8(name).to_be_bytes());
            let encoded = self.element(value);
            out.extend_from_slice(&encoded);
        }
        out
    }

    pub fn element(&mut self, value: Elem<'_>) -> Vec<u8> {
        match value {
            Elem::Str(text) => {
                let mut out = vec![b's'];
                out.extend_from_slice(&self.utf8(text).to_be_bytes());
                out
            }
            Elem::Int(v) => {
                let mut out = vec![b'I'];
                out.extend_from_slice(&self.integer(v).to_be_bytes());
                out
            }
            Elem::Class(descriptor) => {
                let mut out = vec![b'c'];
                out.extend_from_slice(&self.utf8(descriptor).to_be_bytes());
                out
            }
            Elem::Enum(type_descriptor, name) => {
                let mut out = vec![b'e'];
                out.extend_from_slice(&self.utf8(type_descriptor).to_be_bytes());
                out.extend_from_slice(&self.utf8(name).to_be_bytes());
                out
            }
            Elem::Array(values) => {
                let mut out = vec![b'['];
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for v in values {
                    let encoded = self.element(v);
                    out.extend_from_slice(&encoded);
                }
                out
            }
            Elem::Nested(type_descriptor, elements) => {
                let mut out = vec![b'@'];
                let encoded = self.annotation(type_descriptor, elements);
                out.extend_from_slice(&encoded);
                out
            }
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        let mut fields = Vec::new();
        for member in std::mem::take(&mut self.fields) {
            fields.push(self.member(member));
        }
        let mut methods = Vec::new();
        for member in std::mem::take(&mut self.methods) {
            methods.push(self.member(member));
        }

        let mut class_attrs = Vec::new();
        let visible = std::mem::take(&mut self.visible);
        if !visible.is_empty() {
            class_attrs.push(self.attribute("RuntimeVisibleAnnotations", annotations_body(&visible)));
        }
        let invisible = std::mem::take(&mut self.invisible);
        if !invisible.is_empty() {
            class_attrs.push(
                self.attribute("RuntimeInvisibleAnnotations", annotations_body(&invisible)),
            );
        }
        if !self.bootstrap.is_empty() {
            let mut body = (self.bootstrap.len() as u16).to_be_bytes().to_vec();
            for (handle, args) in &self.bootstrap {
                body.extend_from_slice(&handle.to_be_bytes());
                body.extend_from_slice(&(args.len() as u16).to_be_bytes());
                for arg in args {
                    body.extend_from_slice(&arg.to_be_bytes());
                }
            }
            class_attrs.push(self.attribute("BootstrapMethods", body));
        }
        for (name, body) in std::mem::take(&mut self.extra) {
            class_attrs.push(self.attribute(&name, body));
        }

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 61];
        out.extend_from_slice(&self.count.to_be_bytes());
        out.extend_from_slice(&self.pool);
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        for list in [fields, methods, class_attrs] {
            out.extend_from_slice(&(list.len() as u16).to_be_bytes());
            for item in list {
                out.extend_from_slice(&item);
            }
        }
        out
    }

    fn member(&mut self, member: Member) -> Vec<u8> {
        let mut attrs = Vec::new();
        if let Some(constant) = member.constant {
            attrs.push(self.attribute("ConstantValue", constant.to_be_bytes().to_vec()));
        }
        if let Some(code) = member.code {
            let mut body = vec![0, 8, 0, 8];
            body.extend_from_slice(&(code.len() as u32).to_be_bytes());
            body.extend_from_slice(&code);
            body.extend_from_slice(&[0, 0, 0, 0]);
            attrs.push(self.attribute("Code", body));
        }
        if !member.visible.is_empty() {
            attrs.push(self.attribute("RuntimeVisibleAnnotations", annotations_body(&member.visible)));
        }
        if !member.invisible.is_empty() {
            attrs.push(
                self.attribute("RuntimeInvisibleAnnotations", annotations_body(&member.invisible)),
            );
        }
        if !member.visible_parameters.is_empty() {
            let mut body = vec![member.visible_parameters.len() as u8];
            for annotations in &member.visible_parameters {
                body.extend_from_slice(&annotations_body(annotations));
            }
            attrs.push(self.attribute("RuntimeVisibleParameterAnnotations", body));
        }
        if let Some(value) = member.annotation_default {
            attrs.push(self.attribute("AnnotationDefault", value));
        }

        let mut out = 0x0019u16.to_be_bytes().to_vec();
        out.extend_from_slice(&member.name.to_be_bytes());
        out.extend_from_slice(&member.descriptor.to_be_bytes());
        out.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        for attr in attrs {
            out.extend_from_slice(&attr);
        }
        out
    }

    fn attribute(&mut self, name: &str, body: Vec<u8>) -> Vec<u8> {
        let mut out = self.utf8(name).to_be_bytes().to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

fn annotations_body(annotations: &[Vec<u8>]) -> Vec<u8> {
    let mut out = (annotations.len() as u16).to_be_bytes().to_vec();
    for annotation in annotations {
        out.extend_from_slice(annotation);
    }
    out
}

/// `ldc` for indices that fit one byte, `ldc_w` otherwise.
pub fn ldc(index: u16) -> Vec<u8> {
    match u8::try_from(index) {
        Ok(narrow) => vec![0x12, narrow],
        Err(_) => {
            let [hi, lo] = index.to_be_bytes();
            vec![0x13, hi, lo]
        }
    }
}

/// `invokedynamic` naming pool entry `index`.
pub fn invokedynamic(index: u16) -> Vec<u8> {
    let [hi, lo] = index.to_be_bytes();
    vec![0xBA, hi, lo, 0, 0]
}
