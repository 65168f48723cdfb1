//! Recursive-descent parser for Lum.
//!
//! One parser instance handles one source file. The module graph is built by
//! `parse_program`: each file becomes a `Pragma` node whose first two
//! children are its import and export blocks; `.lum` imports are read from
//! disk and parsed into sibling pragmas, appended before the importing file
//! so the entry file's pragma is always the last child of `Program`.

use std::collections::HashSet;
use std::fs;

use crate::ast::{Node, NodeKind, Primitive};
use crate::error::{LumError, LumResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::span::Span;

/// Parse an entry file (and, transitively, everything it imports) into a
/// `Program` node.
pub fn parse_program(source: &str, file: &str) -> LumResult<Node> {
    let mut program = Node::new(NodeKind::Program);
    let mut parsed = HashSet::new();
    add_pragma(&mut program, source, file, &mut parsed)?;
    Ok(program)
}

fn add_pragma(
    program: &mut Node,
    source: &str,
    file: &str,
    parsed: &mut HashSet<String>,
) -> LumResult<()> {
    parsed.insert(file.to_string());

    let lexer = Lexer::new(source, file)?;
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens, lexer.source(), file);

    let mut body = Vec::new();
    while !parser.at_eof() {
        if let Some(stmt) = parser.parse_statement()? {
            body.push(stmt);
        }
    }

    let pending: Vec<String> = parser
        .import_block
        .children
        .iter()
        .filter(|c| c.value.ends_with(".lum") && !parsed.contains(&c.value))
        .map(|c| c.value.clone())
        .collect();

    let mut pragma = Node::leaf(NodeKind::Pragma, file);
    pragma.push(parser.import_block);
    pragma.push(parser.export_block);
    pragma.children.extend(body);

    for import in pending {
        if parsed.contains(&import) {
            continue;
        }
        let text = fs::read_to_string(&import)
            .map_err(|e| LumError::module(format!("Cannot open file: {import} ({e})")))?;
        add_pragma(program, &text, &import, parsed)?;
    }

    program.push(pragma);
    Ok(())
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    source: &'a str,
    import_block: Node,
    export_block: Node,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, source: &'a str, file: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.to_string(),
            source,
            import_block: Node::new(NodeKind::ImportBlock),
            export_block: Node::new(NodeKind::ImportBlock),
        }
    }

    fn peek(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek(0).clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(0).kind, TokenKind::Eof)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek(0).kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> LumResult<Token> {
        if self.peek(0).kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err(msg))
        }
    }

    fn expect_ident(&mut self, msg: &str) -> LumResult<String> {
        match self.peek(0).kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.err(msg)),
        }
    }

    fn expect_string(&mut self, msg: &str) -> LumResult<String> {
        match self.peek(0).kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.err(msg)),
        }
    }

    fn err(&self, msg: impl Into<String>) -> LumError {
        self.err_at(msg, self.peek(0).span)
    }

    fn err_at(&self, msg: impl Into<String>, span: Span) -> LumError {
        let (line, col) = span.line_col(self.source);
        LumError::parser(msg, &self.file, line, col)
    }

    // === Statements ===

    /// Parse one statement. `import` consumes into the pragma's import block
    /// and produces no body statement.
    pub fn parse_statement(&mut self) -> LumResult<Option<Node>> {
        match self.peek(0).kind.clone() {
            TokenKind::LBrace => Ok(Some(self.parse_block()?)),

            TokenKind::Primitive(p) => {
                self.advance();
                let (is_array, size) = self.parse_optional_array_size()?;
                let name = self.expect_ident("Expected identifier after type")?;
                Ok(Some(self.parse_primitive_declaration(name, p, is_array, size)?))
            }

            TokenKind::Ident(name) => match self.peek(1).kind.clone() {
                TokenKind::Equal => {
                    self.advance();
                    self.advance();
                    let mut node = Node::leaf(NodeKind::PrimitiveAssign, name);
                    node.push(self.parse_expression()?);
                    self.expect(TokenKind::Semi, "Expected ';' after assignment")?;
                    Ok(Some(node))
                }
                TokenKind::LBrace => Ok(Some(self.parse_ndarray_declaration(name)?)),
                TokenKind::Ident(_) => {
                    self.advance();
                    let var = self.expect_ident("Expected identifier after type")?;
                    Ok(Some(self.parse_user_type_declaration(name, var)?))
                }
                _ => Ok(Some(self.parse_expression_statement()?)),
            },

            TokenKind::Return
            | TokenKind::If
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Fin
            | TokenKind::Native
            | TokenKind::Struct
            | TokenKind::Import
            | TokenKind::Export
            | TokenKind::Link => self.parse_keyword_statement(),

            _ => Ok(Some(self.parse_expression_statement()?)),
        }
    }

    /// A statement position where `import` is not meaningful.
    fn parse_required_statement(&mut self) -> LumResult<Node> {
        match self.parse_statement()? {
            Some(stmt) => Ok(stmt),
            None => Err(self.err("Expected statement")),
        }
    }

    fn parse_expression_statement(&mut self) -> LumResult<Node> {
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semi, "Expected ';' after expression")?;
        Ok(Node::with_children(NodeKind::ExprStatement, vec![expr]))
    }

    fn parse_block(&mut self) -> LumResult<Node> {
        self.expect(TokenKind::LBrace, "Expected '{' at start of block")?;
        let mut node = Node::new(NodeKind::Block);
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if let Some(stmt) = self.parse_statement()? {
                node.push(stmt);
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}' at end of block")?;
        Ok(node)
    }

    /// `[size]` / `[]` after a declared type. Returns whether brackets were
    /// present and the optional size expression.
    fn parse_optional_array_size(&mut self) -> LumResult<(bool, Option<Node>)> {
        if !self.eat(&TokenKind::LBracket) {
            return Ok((false, None));
        }
        let size = if self.check(&TokenKind::RBracket) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RBracket, "Expected ']' after array declaration")?;
        Ok((true, size))
    }

    fn sized_array_node(&self, primitive: Primitive, size: Node) -> Node {
        let mut node = Node::new(NodeKind::SizedArrayDeclare);
        node.primitive = primitive;
        node.push(size);
        node
    }

    fn parse_primitive_declaration(
        &mut self,
        name: String,
        primitive: Primitive,
        _is_array: bool,
        size: Option<Node>,
    ) -> LumResult<Node> {
        let mut node = Node::leaf(NodeKind::PrimitiveAssign, name);
        node.primitive = primitive;

        if let Some(size) = size {
            node.push(self.sized_array_node(primitive, size));
        }
        if self.eat(&TokenKind::Equal) {
            node.push(self.parse_expression()?);
        }

        self.expect(TokenKind::Semi, "Expected ';' after assignment")?;
        Ok(node)
    }

    fn parse_user_type_declaration(&mut self, type_name: String, var: String) -> LumResult<Node> {
        let (_is_array, size) = self.parse_optional_array_size()?;

        if self.eat(&TokenKind::Equal) {
            if self.check(&TokenKind::LBrace) {
                return self.parse_struct_literal(type_name, var);
            }
            let mut node = Node::leaf(NodeKind::StructAssign, var);
            node.push(Node::leaf(NodeKind::Identifier, type_name));
            node.push(self.parse_expression()?);
            self.expect(TokenKind::Semi, "Expected ';' after struct declaration")?;
            return Ok(node);
        }

        let mut node = Node::leaf(NodeKind::StructAssign, var);
        node.push(Node::leaf(NodeKind::Identifier, type_name));
        if let Some(size) = size {
            node.push(self.sized_array_node(Primitive::None, size));
        }
        self.expect(TokenKind::Semi, "Expected ';' after struct declaration")?;
        Ok(node)
    }

    /// `P p = { 1, 2 }` or `P p = { x: 1, y: 2 }` (forms may mix).
    fn parse_struct_literal(&mut self, type_name: String, var: String) -> LumResult<Node> {
        self.expect(TokenKind::LBrace, "Expected '{' after struct declaration")?;

        let mut node = Node::leaf(NodeKind::StructAssign, var);
        node.push(Node::leaf(NodeKind::String, type_name));

        while !self.check(&TokenKind::RBrace) {
            if matches!(self.peek(0).kind, TokenKind::Ident(_))
                && self.peek(1).kind == TokenKind::Colon
            {
                let field = self.expect_ident("Expected field name")?;
                self.advance(); // :
                let mut assign = Node::leaf(NodeKind::PrimitiveAssign, field);
                assign.push(self.parse_expression()?);
                node.push(assign);
            } else {
                node.push(self.parse_expression()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RBrace, "Expected '}' after struct initializer")?;
        self.expect(TokenKind::Semi, "Expected ';' after struct declaration")?;
        Ok(node)
    }

    /// `name { d1, d2, … } [!|!!]? [= expr]? ;`
    fn parse_ndarray_declaration(&mut self, name: String) -> LumResult<Node> {
        self.advance(); // name
        self.advance(); // {

        let mut shape = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            shape.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}' after NDArray declaration")?;

        let mut efficiency = 0;
        while self.eat(&TokenKind::Not) {
            efficiency += 1;
            if efficiency > 2 {
                return Err(self.err("Invalid self-reference level"));
            }
        }

        let init = if self.eat(&TokenKind::Equal) {
            self.parse_expression()?
        } else {
            Node::leaf(NodeKind::Number, "0")
        };

        let mut node = Node::leaf(NodeKind::NdArrayAssign, name);
        node.push(Node::leaf(NodeKind::Number, efficiency.to_string()));
        node.children.extend(shape);
        node.push(init);

        self.expect(TokenKind::Semi, "Expected ';' after NDArray assignment")?;
        Ok(node)
    }

    fn parse_keyword_statement(&mut self) -> LumResult<Option<Node>> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Return => {
                let mut node = Node::new(NodeKind::Return);
                if !self.check(&TokenKind::Semi) {
                    node.push(self.parse_expression()?);
                }
                self.expect(TokenKind::Semi, "Expected ';' after return statement")?;
                Ok(Some(node))
            }

            TokenKind::If => {
                let mut node = Node::new(NodeKind::If);
                self.expect(TokenKind::LParen, "Expected '(' after if")?;
                node.push(self.parse_expression()?);
                self.expect(TokenKind::RParen, "Expected ')' after if condition")?;
                node.push(self.parse_required_statement()?);
                if self.eat(&TokenKind::Else) {
                    let mut else_node = Node::new(NodeKind::Else);
                    else_node.push(self.parse_required_statement()?);
                    node.push(else_node);
                }
                Ok(Some(node))
            }

            TokenKind::While => {
                let mut node = Node::new(NodeKind::While);
                self.expect(TokenKind::LParen, "Expected '(' after while")?;
                node.push(self.parse_expression()?);
                self.expect(TokenKind::RParen, "Expected ')' after while condition")?;
                node.push(self.parse_required_statement()?);
                Ok(Some(node))
            }

            TokenKind::For => Ok(Some(self.parse_for()?)),
            TokenKind::Fin => Ok(Some(self.parse_function(false)?)),

            TokenKind::Native => {
                self.expect(TokenKind::Fin, "Expected 'fin' after 'native'")?;
                let func = self.parse_function(true)?;
                Ok(Some(Node::with_children(NodeKind::NativeStatement, vec![func])))
            }

            TokenKind::Struct => Ok(Some(self.parse_struct_declare()?)),

            TokenKind::Import => {
                let path = self.expect_string("Expected import string following import declaration")?;
                let mut entry = Node::leaf(NodeKind::String, path.clone());
                if self.eat(&TokenKind::As) {
                    let alias = self.expect_ident("Expected alias name after 'as'")?;
                    entry.push(Node::leaf(NodeKind::Identifier, alias));
                } else if path.ends_with(".lum") {
                    return Err(self.err("Expected 'as' alias for .lum import"));
                }
                self.expect(TokenKind::Semi, "Expected ';' after import statement")?;
                self.import_block.push(entry);
                Ok(None)
            }

            TokenKind::Export => {
                let stmt = self.parse_required_statement()?;
                if stmt.value.is_empty() {
                    return Err(self.err("Exported statement must declare a name"));
                }
                self.export_block
                    .push(Node::leaf(NodeKind::Identifier, stmt.value.clone()));
                Ok(Some(stmt))
            }

            TokenKind::Link => {
                let path = self.expect_string("Expected plug-in path following link")?;
                self.expect(TokenKind::Semi, "Expected ';' after link statement")?;
                Ok(Some(Node::with_children(
                    NodeKind::NativeStatement,
                    vec![Node::leaf(NodeKind::String, path)],
                )))
            }

            other => Err(self.err(format!("Unexpected keyword: {}", other.describe()))),
        }
    }

    /// Two forms: enhanced `for (T x : iterable) stmt` (tagged "1") and
    /// C-style `for (init; cond; step) stmt` (tagged "0").
    fn parse_for(&mut self) -> LumResult<Node> {
        self.expect(TokenKind::LParen, "Expected '(' after for")?;

        let enhanced = matches!(
            self.peek(0).kind,
            TokenKind::Primitive(_) | TokenKind::Ident(_)
        ) && matches!(self.peek(1).kind, TokenKind::Ident(_))
            && self.peek(2).kind == TokenKind::Colon;

        if enhanced {
            let binding = match self.advance().kind {
                TokenKind::Primitive(p) => {
                    let name = self.expect_ident("Expected identifier after type")?;
                    let mut node = Node::leaf(NodeKind::PrimitiveAssign, name);
                    node.primitive = p;
                    node
                }
                TokenKind::Ident(type_name) => {
                    let name = self.expect_ident("Expected identifier after type")?;
                    let mut node = Node::leaf(NodeKind::StructAssign, name);
                    node.push(Node::leaf(NodeKind::Identifier, type_name));
                    node
                }
                _ => unreachable!("guarded by the lookahead above"),
            };
            self.expect(TokenKind::Colon, "Expected ':' in for-in loop")?;
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::RParen, "Expected ')' after for loop header")?;
            let body = self.parse_required_statement()?;

            let mut node = Node::leaf(NodeKind::For, "1");
            node.children = vec![binding, iterable, body];
            return Ok(node);
        }

        let init = self.parse_required_statement()?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Semi, "Expected ';' after for loop condition")?;
        let step = self.parse_expression()?;
        self.expect(TokenKind::RParen, "Expected ')' after for loop increment")?;
        let body = self.parse_required_statement()?;

        let mut node = Node::leaf(NodeKind::For, "0");
        node.children = vec![init, cond, step, body];
        Ok(node)
    }

    /// `fin [retType] name(params) [-> retType] body`; `native` restricts
    /// the body to `;`.
    fn parse_function(&mut self, native: bool) -> LumResult<Node> {
        let mut ret_type = "nil".to_string();

        match self.peek(0).kind.clone() {
            TokenKind::Primitive(p) if matches!(self.peek(1).kind, TokenKind::Ident(_)) => {
                self.advance();
                ret_type = prim_name(p).to_string();
            }
            TokenKind::Void if matches!(self.peek(1).kind, TokenKind::Ident(_)) => {
                self.advance();
            }
            TokenKind::Ident(t) if matches!(self.peek(1).kind, TokenKind::Ident(_)) => {
                self.advance();
                ret_type = t;
            }
            _ => {}
        }

        let name = self.expect_ident("Expected identifier after 'fin'")?;
        let mut node = Node::leaf(NodeKind::Function, name);
        self.expect(TokenKind::LParen, "Expected '(' after function name")?;

        while !self.check(&TokenKind::RParen) {
            let type_node = match self.advance().kind {
                TokenKind::Primitive(p) => Node::leaf(NodeKind::Identifier, prim_name(p)),
                TokenKind::Ident(t) => Node::leaf(NodeKind::Identifier, t),
                _ => return Err(self.err("Expected parameter type")),
            };
            let param_name = self.expect_ident("Expected parameter name")?;
            let mut param = Node::leaf(NodeKind::Identifier, param_name);
            param.push(type_node);

            if self.eat(&TokenKind::Spread) {
                param.push(Node::new(NodeKind::ArrayAssign));
                node.push(param);
                if !self.check(&TokenKind::RParen) {
                    return Err(self.err("Variadic parameter must be the last parameter"));
                }
                break;
            }
            node.push(param);

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "Expected ')' after function parameters")?;

        if self.eat(&TokenKind::Arrow) {
            ret_type = match self.advance().kind {
                TokenKind::Primitive(p) => prim_name(p).to_string(),
                TokenKind::Void => "nil".to_string(),
                TokenKind::Ident(t) => t,
                _ => return Err(self.err("Expected type after arrow")),
            };
        }
        node.ret_type = ret_type;

        let body = if native {
            self.expect(TokenKind::Semi, "Expected ';' after native function declaration")?;
            Node::new(NodeKind::Block)
        } else if self.eat(&TokenKind::Semi) {
            Node::new(NodeKind::Block)
        } else if self.check(&TokenKind::LBrace) {
            self.parse_block()?
        } else {
            self.parse_required_statement()?
        };
        node.push(body);

        Ok(node)
    }

    fn parse_struct_declare(&mut self) -> LumResult<Node> {
        let name = self.expect_ident("Expected struct name following struct declaration")?;
        let mut node = Node::leaf(NodeKind::StructDeclare, name);
        self.expect(TokenKind::LBrace, "Expected '{' after struct declaration")?;

        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let span = self.peek(0).span;
            let field = self.parse_required_statement()?;
            if !matches!(
                field.kind,
                NodeKind::PrimitiveAssign | NodeKind::StructAssign
            ) {
                return Err(self.err_at("Expected field declaration in struct", span));
            }
            node.push(field);
        }

        self.expect(TokenKind::RBrace, "Expected '}' after struct declaration")?;
        self.expect(TokenKind::Semi, "Expected ';' after struct declaration")?;
        Ok(node)
    }

    // === Expressions ===

    pub fn parse_expression(&mut self) -> LumResult<Node> {
        let primary = self.parse_primary()?;
        self.parse_binary_op(primary, 0)
    }

    fn parse_binary_op(&mut self, mut left: Node, min_precedence: i32) -> LumResult<Node> {
        loop {
            let prec = precedence(&self.peek(0).kind);
            if prec < min_precedence {
                break;
            }
            let op_tok = self.advance();
            let mut right = self.parse_primary()?;
            if prec < precedence(&self.peek(0).kind) {
                right = self.parse_binary_op(right, prec + 1)?;
            }
            let mut node = Node::new(NodeKind::BinaryOp);
            node.op = op_tok.kind.op_code();
            node.children = vec![left, right];
            left = node;
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> LumResult<Node> {
        match self.peek(0).kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Node::leaf(NodeKind::Number, n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Node::leaf(NodeKind::String, s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Node::leaf(NodeKind::Bool, "1"))
            }
            TokenKind::False => {
                self.advance();
                Ok(Node::leaf(NodeKind::Bool, "0"))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::At => {
                self.advance();
                self.parse_postfix(Node::new(NodeKind::SelfRef))
            }
            TokenKind::Ident(name) => {
                self.advance();
                let node = self.parse_postfix(Node::leaf(NodeKind::Identifier, name))?;
                if matches!(node.kind, NodeKind::Identifier) && self.eat(&TokenKind::Equal) {
                    let mut assign = Node::leaf(NodeKind::PrimitiveAssign, node.value.clone());
                    assign.push(self.parse_expression()?);
                    return Ok(assign);
                }
                Ok(node)
            }
            TokenKind::LParen => {
                self.advance();
                let node = self.parse_expression()?;
                self.expect(TokenKind::RParen, "Expected ')' after expression")?;
                Ok(node)
            }
            TokenKind::Minus | TokenKind::Not | TokenKind::BitNot => {
                let tok = self.advance();
                let mut node = Node::new(NodeKind::UnaryOp);
                node.op = tok.kind.op_code();
                node.push(self.parse_primary()?);
                Ok(node)
            }
            other => Err(self.err(format!(
                "Unexpected token in primary expression: {}",
                other.describe()
            ))),
        }
    }

    /// Suffix chains on an identifier or `@`: indexing, field reads, calls;
    /// a trailing `= expr` after an index or read chain converts the access
    /// into an assignment.
    fn parse_postfix(&mut self, mut node: Node) -> LumResult<Node> {
        loop {
            if self.eat(&TokenKind::LBracket) {
                let indices = self.parse_index_list()?;
                if self.eat(&TokenKind::Equal) {
                    let value = self.parse_expression()?;
                    return Ok(Node::with_children(
                        NodeKind::ArrayAssign,
                        vec![node, indices, value],
                    ));
                }
                node = Node::with_children(NodeKind::ArrayAccess, vec![node, indices]);
            } else if self.eat(&TokenKind::Dot) {
                loop {
                    let field = self.expect_ident("Expected identifier after '.'")?;
                    node = Node::with_children(
                        NodeKind::Read,
                        vec![node, Node::leaf(NodeKind::Identifier, field)],
                    );
                    if !self.eat(&TokenKind::Dot) {
                        break;
                    }
                }
                if self.eat(&TokenKind::Equal) {
                    let value = self.parse_expression()?;
                    return Ok(Node::with_children(
                        NodeKind::PrimitiveAssign,
                        vec![node, value],
                    ));
                }
            } else if self.eat(&TokenKind::LParen) {
                let mut call = Node::with_children(NodeKind::Call, vec![node]);
                while !self.check(&TokenKind::RParen) {
                    let arg = self.parse_expression()?;
                    if self.eat(&TokenKind::Range) {
                        let end = self.parse_expression()?;
                        call.push(Node::with_children(NodeKind::Range, vec![arg, end]));
                    } else {
                        call.push(arg);
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "Expected ')' after function arguments")?;
                node = call;
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// Comma-separated indices inside `[ ]`; each entry is an expression or
    /// an inclusive `a..b` range.
    fn parse_index_list(&mut self) -> LumResult<Node> {
        let mut indices = Node::new(NodeKind::Block);
        loop {
            let start = self.parse_expression()?;
            if self.eat(&TokenKind::Range) {
                let end = self.parse_expression()?;
                indices.push(Node::with_children(NodeKind::Range, vec![start, end]));
            } else {
                indices.push(start);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "Expected ']' after array index")?;
        Ok(indices)
    }

    fn parse_array_literal(&mut self) -> LumResult<Node> {
        self.expect(TokenKind::LBracket, "Expected '[' after array declaration")?;
        let mut node = Node::new(NodeKind::ArrayLiteral);
        while !self.check(&TokenKind::RBracket) {
            let value = self.parse_expression()?;
            if self.eat(&TokenKind::Range) {
                let end = self.parse_expression()?;
                node.push(Node::with_children(NodeKind::Range, vec![value, end]));
            } else {
                node.push(value);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "Expected ']' after array declaration")?;
        Ok(node)
    }
}

fn precedence(kind: &TokenKind) -> i32 {
    match kind {
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 3,
        TokenKind::Plus | TokenKind::Minus => 2,
        TokenKind::Equal
        | TokenKind::EqEq
        | TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::Le
        | TokenKind::Ge => 1,
        TokenKind::And | TokenKind::Or => 0,
        _ => -1,
    }
}

fn prim_name(p: Primitive) -> &'static str {
    match p {
        Primitive::Int => "int",
        Primitive::Bool => "bool",
        Primitive::String => "string",
        Primitive::None => "nil",
    }
}
