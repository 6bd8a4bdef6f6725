//! Class file fixtures for the integration tests.

#![allow(dead_code)]

use classfold::bytecode::{decode, Insn, InsnList, MethodBody};
use classfold::classfile::{
    write_line_numbers, AttributeInfo, ClassFile, CodeAttribute, ConstantPool,
    ExceptionTableEntry, LineNumberEntry, MethodInfo, ACC_STATIC,
};

/// Builds a class with static methods from raw bytecode.
pub struct ClassBuilder {
    pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    code_name: u16,
    methods: Vec<MethodInfo>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(name).unwrap();
        let super_class = pool.add_class("java/lang/Object").unwrap();
        let code_name = pool.add_utf8("Code").unwrap();
        Self {
            pool,
            this_class,
            super_class,
            code_name,
            methods: Vec::new(),
        }
    }

    /// Pool access for `ldc` operands.
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    pub fn method(self, name: &str, descriptor: &str, max_locals: u16, code: Vec<u8>) -> Self {
        let code = CodeAttribute {
            max_stack: 4,
            max_locals,
            code,
            exception_table: vec![],
            attributes: vec![],
        };
        self.method_with(name, descriptor, code)
    }

    /// Adds a method with a `LineNumberTable` of `(start_pc, line)` rows.
    pub fn method_with_lines(
        mut self,
        name: &str,
        descriptor: &str,
        max_locals: u16,
        code: Vec<u8>,
        lines: &[(u16, u16)],
    ) -> Self {
        let lnt = self.pool.add_utf8("LineNumberTable").unwrap();
        let rows: Vec<LineNumberEntry> = lines
            .iter()
            .map(|&(start_pc, line)| LineNumberEntry { start_pc, line })
            .collect();
        let code = CodeAttribute {
            max_stack: 4,
            max_locals,
            code,
            exception_table: vec![],
            attributes: vec![AttributeInfo {
                name_index: lnt,
                info: write_line_numbers(&rows),
            }],
        };
        self.method_with(name, descriptor, code)
    }

    /// Adds a method with an exception table.
    pub fn method_with_handlers(
        self,
        name: &str,
        descriptor: &str,
        max_locals: u16,
        code: Vec<u8>,
        handlers: Vec<ExceptionTableEntry>,
    ) -> Self {
        let code = CodeAttribute {
            max_stack: 4,
            max_locals,
            code,
            exception_table: handlers,
            attributes: vec![],
        };
        self.method_with(name, descriptor, code)
    }

    pub fn method_with(mut self, name: &str, descriptor: &str, code: CodeAttribute) -> Self {
        let name_index = self.pool.add_utf8(name).unwrap();
        let descriptor_index = self.pool.add_utf8(descriptor).unwrap();
        self.methods.push(MethodInfo {
            access_flags: ACC_STATIC,
            name_index,
            descriptor_index,
            attributes: vec![AttributeInfo {
                name_index: self.code_name,
                info: code.to_info(),
            }],
        });
        self
    }

    pub fn build(self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: 50,
            constant_pool: self.pool,
            access_flags: 0x21,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: vec![],
            fields: vec![],
            methods: self.methods,
            attributes: vec![],
        }
    }
}

pub fn code_of(class: &ClassFile, name: &str) -> CodeAttribute {
    let index = class
        .find_method(name)
        .unwrap_or_else(|| panic!("no method {name}"));
    class.method_code(index).unwrap().unwrap()
}

pub fn body_of(class: &ClassFile, name: &str) -> MethodBody {
    MethodBody::from_code(&code_of(class, name), &class.constant_pool).unwrap()
}

pub fn insns_of(class: &ClassFile, name: &str) -> Vec<Insn> {
    let list: InsnList = decode(&code_of(class, name).code).unwrap();
    list.iter().map(|n| n.insn.clone()).collect()
}
