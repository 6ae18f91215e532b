// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The opcode set of protocols 0 through 5.

/// A single-byte instruction of the wire format.
#[allow(missing_docs, reason = "mnemonics mirror the wire format")]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mark = b'(',
    Stop = b'.',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    Float = b'F',
    Int = b'I',
    BinInt = b'J',
    BinInt1 = b'K',
    Long = b'L',
    BinInt2 = b'M',
    None = b'N',
    PersId = b'P',
    BinPersId = b'Q',
    Reduce = b'R',
    String = b'S',
    BinString = b'T',
    ShortBinString = b'U',
    Unicode = b'V',
    BinUnicode = b'X',
    Append = b'a',
    Build = b'b',
    Global = b'c',
    Dict = b'd',
    EmptyDict = b'}',
    Appends = b'e',
    Get = b'g',
    BinGet = b'h',
    Inst = b'i',
    LongBinGet = b'j',
    List = b'l',
    EmptyList = b']',
    Obj = b'o',
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    SetItem = b's',
    Tuple = b't',
    EmptyTuple = b')',
    SetItems = b'u',
    BinFloat = b'G',

    // Protocol 2.
    Proto = 0x80,
    NewObj = 0x81,
    Ext1 = 0x82,
    Ext2 = 0x83,
    Ext4 = 0x84,
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    NewTrue = 0x88,
    NewFalse = 0x89,
    Long1 = 0x8a,
    Long4 = 0x8b,

    // Protocol 3.
    BinBytes = b'B',
    ShortBinBytes = b'C',

    // Protocol 4.
    ShortBinUnicode = 0x8c,
    BinUnicode8 = 0x8d,
    BinBytes8 = 0x8e,
    EmptySet = 0x8f,
    AddItems = 0x90,
    FrozenSet = 0x91,
    NewObjEx = 0x92,
    StackGlobal = 0x93,
    Memoize = 0x94,
    Frame = 0x95,

    // Protocol 5.
    ByteArray8 = 0x96,
    NextBuffer = 0x97,
    ReadOnlyBuffer = 0x98,
}

/// Shape of the inline argument that follows an opcode byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// No inline argument.
    None,
    /// One unsigned byte.
    U8,
    /// Little-endian `u16`.
    U16,
    /// Little-endian `i32`.
    I32,
    /// Little-endian `u32`.
    U32,
    /// Little-endian `u64`.
    U64,
    /// Big-endian IEEE-754 double.
    F64,
    /// A newline-terminated text line.
    Line,
    /// Two newline-terminated lines (module, then name).
    TwoLines,
    /// `u8` length followed by that many bytes.
    Bytes1,
    /// `u32` length followed by that many bytes.
    Bytes4,
    /// `i32` length (negative is invalid) followed by that many bytes.
    SignedBytes4,
    /// `u64` length followed by that many bytes.
    Bytes8,
}

impl Opcode {
    /// Decodes an opcode byte.
    #[must_use]
    pub fn from_u8(b: u8) -> Option<Self> {
        use Opcode::*;
        Some(match b {
            b'(' => Mark,
            b'.' => Stop,
            b'0' => Pop,
            b'1' => PopMark,
            b'2' => Dup,
            b'F' => Float,
            b'I' => Int,
            b'J' => BinInt,
            b'K' => BinInt1,
            b'L' => Long,
            b'M' => BinInt2,
            b'N' => None,
            b'P' => PersId,
            b'Q' => BinPersId,
            b'R' => Reduce,
            b'S' => String,
            b'T' => BinString,
            b'U' => ShortBinString,
            b'V' => Unicode,
            b'X' => BinUnicode,
            b'a' => Append,
            b'b' => Build,
            b'c' => Global,
            b'd' => Dict,
            b'}' => EmptyDict,
            b'e' => Appends,
            b'g' => Get,
            b'h' => BinGet,
            b'i' => Inst,
            b'j' => LongBinGet,
            b'l' => List,
            b']' => EmptyList,
            b'o' => Obj,
            b'p' => Put,
            b'q' => BinPut,
            b'r' => LongBinPut,
            b's' => SetItem,
            b't' => Tuple,
            b')' => EmptyTuple,
            b'u' => SetItems,
            b'G' => BinFloat,
            0x80 => Proto,
            0x81 => NewObj,
            0x82 => Ext1,
            0x83 => Ext2,
            0x84 => Ext4,
            0x85 => Tuple1,
            0x86 => Tuple2,
            0x87 => Tuple3,
            0x88 => NewTrue,
            0x89 => NewFalse,
            0x8a => Long1,
            0x8b => Long4,
            b'B' => BinBytes,
            b'C' => ShortBinBytes,
            0x8c => ShortBinUnicode,
            0x8d => BinUnicode8,
            0x8e => BinBytes8,
            0x8f => EmptySet,
            0x90 => AddItems,
            0x91 => FrozenSet,
            0x92 => NewObjEx,
            0x93 => StackGlobal,
            0x94 => Memoize,
            0x95 => Frame,
            0x96 => ByteArray8,
            0x97 => NextBuffer,
            0x98 => ReadOnlyBuffer,
            _ => return Option::None,
        })
    }

    /// Returns the opcode byte.
    #[inline]
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Returns the canonical upper-case mnemonic.
    #[must_use]
    pub const fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Mark => "MARK",
            Stop => "STOP",
            Pop => "POP",
            PopMark => "POP_MARK",
            Dup => "DUP",
            Float => "FLOAT",
            Int => "INT",
            BinInt => "BININT",
            BinInt1 => "BININT1",
            Long => "LONG",
            BinInt2 => "BININT2",
            None => "NONE",
            PersId => "PERSID",
            BinPersId => "BINPERSID",
            Reduce => "REDUCE",
            String => "STRING",
            BinString => "BINSTRING",
            ShortBinString => "SHORT_BINSTRING",
            Unicode => "UNICODE",
            BinUnicode => "BINUNICODE",
            Append => "APPEND",
            Build => "BUILD",
            Global => "GLOBAL",
            Dict => "DICT",
            EmptyDict => "EMPTY_DICT",
            Appends => "APPENDS",
            Get => "GET",
            BinGet => "BINGET",
            Inst => "INST",
            LongBinGet => "LONG_BINGET",
            List => "LIST",
            EmptyList => "EMPTY_LIST",
            Obj => "OBJ",
            Put => "PUT",
            BinPut => "BINPUT",
            LongBinPut => "LONG_BINPUT",
            SetItem => "SETITEM",
            Tuple => "TUPLE",
            EmptyTuple => "EMPTY_TUPLE",
            SetItems => "SETITEMS",
            BinFloat => "BINFLOAT",
            Proto => "PROTO",
            NewObj => "NEWOBJ",
            Ext1 => "EXT1",
            Ext2 => "EXT2",
            Ext4 => "EXT4",
            Tuple1 => "TUPLE1",
            Tuple2 => "TUPLE2",
            Tuple3 => "TUPLE3",
            NewTrue => "NEWTRUE",
            NewFalse => "NEWFALSE",
            Long1 => "LONG1",
            Long4 => "LONG4",
            BinBytes => "BINBYTES",
            ShortBinBytes => "SHORT_BINBYTES",
            ShortBinUnicode => "SHORT_BINUNICODE",
            BinUnicode8 => "BINUNICODE8",
            BinBytes8 => "BINBYTES8",
            EmptySet => "EMPTY_SET",
            AddItems => "ADDITEMS",
            FrozenSet => "FROZENSET",
            NewObjEx => "NEWOBJ_EX",
            StackGlobal => "STACK_GLOBAL",
            Memoize => "MEMOIZE",
            Frame => "FRAME",
            ByteArray8 => "BYTEARRAY8",
            NextBuffer => "NEXT_BUFFER",
            ReadOnlyBuffer => "READONLY_BUFFER",
        }
    }

    /// Returns the shape of the inline argument.
    #[must_use]
    pub const fn arg_kind(self) -> ArgKind {
        use Opcode::*;
        match self {
            Float | Int | Long | PersId | String | Unicode | Get | Put => ArgKind::Line,
            Global | Inst => ArgKind::TwoLines,
            BinInt => ArgKind::I32,
            BinInt1 | BinGet | BinPut | Proto | Ext1 => ArgKind::U8,
            BinInt2 | Ext2 => ArgKind::U16,
            Ext4 => ArgKind::I32,
            LongBinGet | LongBinPut => ArgKind::U32,
            BinFloat => ArgKind::F64,
            Frame => ArgKind::U64,
            ShortBinString | ShortBinBytes | ShortBinUnicode | Long1 => ArgKind::Bytes1,
            BinUnicode | BinBytes => ArgKind::Bytes4,
            BinString | Long4 => ArgKind::SignedBytes4,
            BinUnicode8 | BinBytes8 | ByteArray8 => ArgKind::Bytes8,
            _ => ArgKind::None,
        }
    }

    /// Returns the lowest protocol that defines this opcode.
    #[must_use]
    pub const fn protocol(self) -> u8 {
        use Opcode::*;
        match self {
            BinInt | BinInt1 | BinInt2 | BinPersId | BinString | ShortBinString | BinUnicode
            | EmptyDict | Appends | BinGet | LongBinGet | EmptyList | Obj | BinPut
            | LongBinPut | EmptyTuple | SetItems | BinFloat | PopMark => 1,
            Proto | NewObj | Ext1 | Ext2 | Ext4 | Tuple1 | Tuple2 | Tuple3 | NewTrue
            | NewFalse | Long1 | Long4 => 2,
            BinBytes | ShortBinBytes => 3,
            ShortBinUnicode | BinUnicode8 | BinBytes8 | EmptySet | AddItems | FrozenSet
            | NewObjEx | StackGlobal | Memoize | Frame => 4,
            ByteArray8 | NextBuffer | ReadOnlyBuffer => 5,
            _ => 0,
        }
    }
}
